mod rds;
mod s3;
mod vpc;

use crate::error::Result;
use crate::rules::RegistryBuilder;

pub(super) fn register(builder: &RegistryBuilder) -> Result<()> {
    builder.register(s3::no_public_access_with_acl())?;
    builder.register(vpc::no_public_ingress_sgr())?;
    builder.register(rds::encrypt_instance_storage_data())?;
    Ok(())
}
