mod aws;
mod azure;

use super::RegistryBuilder;
use crate::error::Result;

/// Register every built-in rule package.
pub fn register_all(builder: &RegistryBuilder) -> Result<()> {
    azure::register(builder)?;
    aws::register(builder)?;
    tracing::debug!(rules = builder.len(), "registered built-in rules");
    Ok(())
}
