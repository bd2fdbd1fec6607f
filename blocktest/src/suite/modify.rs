//! Scenarios of the `modify` suite

use super::{BLOCK_NAME, SuiteContext};
use crate::block::{AuthMode, BlockOptions, CreateOutcome, check_reply};
use crate::cluster::Executor;
use anyhow::{Result, bail, ensure};

/// Enabling auth must set a password, disabling it must clear it again.
pub(super) async fn auth_toggle<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    let volume = ctx.volume_name();

    if let CreateOutcome::Rejected(r) = ctx
        .blocks
        .setup_block(volume, BLOCK_NAME, &servers, "2GiB", &BlockOptions::with_ha(3))
        .await?
    {
        bail!("Creating block {BLOCK_NAME} was rejected: {r}");
    }

    for (auth, expect_password) in [(AuthMode::Enable, true), (AuthMode::Disable, false)] {
        let out = ctx.blocks.block_modify(volume, BLOCK_NAME, &auth).await?;
        if let Err(failure) = check_reply(&out) {
            bail!("Setting auth {auth} on {BLOCK_NAME} failed: {failure}");
        }

        let attributes = ctx
            .blocks
            .get_block_info(volume, BLOCK_NAME)
            .await?
            .attributes();
        let password = attributes.get("PASSWORD").map_or("", String::as_str);

        ensure!(
            password.is_empty() != expect_password,
            "Unexpected password {password:?} after setting auth {auth}"
        );
    }

    Ok(())
}
