mod security_center;
mod storage;

use crate::error::Result;
use crate::rules::RegistryBuilder;

pub(super) fn register(builder: &RegistryBuilder) -> Result<()> {
    builder.register(security_center::enable_standard_subscription())?;
    builder.register(storage::enforce_https())?;
    Ok(())
}
