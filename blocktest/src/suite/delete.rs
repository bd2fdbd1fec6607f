//! Scenarios of the `delete` suite

use super::{BLOCK_NAME, SuiteContext};
use crate::block::{BlockOptions, CreateOutcome, DeleteOptions, UnlinkStorage, check_reply};
use crate::cluster::Executor;
use anyhow::{Context, Result, bail, ensure};

const LOOP_BLOCKS: usize = 9;

/// Creates several blocks, then deletes all of them with the CLI defaults.
pub(super) async fn delete_loop<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    for i in 1..=LOOP_BLOCKS {
        let name = format!("block_testing_{i}");
        let servers = ctx.sample_servers(3)?;

        if let CreateOutcome::Rejected(r) = ctx
            .blocks
            .setup_block(
                ctx.volume_name(),
                &name,
                &servers,
                "1GiB",
                &BlockOptions::with_ha(3),
            )
            .await?
        {
            bail!("Creating block {name} was rejected: {r}");
        }
    }

    let volume = ctx.volume_name();
    let blocks = ctx
        .blocks
        .get_block_list(volume)
        .await?
        .context("No blocks listed after creating them")?;

    for i in 1..=LOOP_BLOCKS {
        let name = format!("block_testing_{i}");
        ensure!(blocks.contains(&name), "Block {name} is not listed");
    }

    for name in &blocks {
        let out = ctx
            .blocks
            .block_delete(volume, name, &DeleteOptions::default())
            .await?;
        if let Err(failure) = check_reply(&out) {
            bail!("Block {name} could not be deleted: {failure}");
        }
    }

    let remaining = ctx.blocks.get_block_list(volume).await?;
    ensure!(
        remaining.is_none(),
        "Block list is not empty after deleting all blocks: {remaining:?}"
    );

    Ok(())
}

/// Deleting with `unlink-storage no` must keep the backing file.
pub(super) async fn unlink_storage_no<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    let volume = ctx.volume_name();

    if let CreateOutcome::Rejected(r) = ctx
        .blocks
        .setup_block(volume, BLOCK_NAME, &servers, "1GiB", &BlockOptions::with_ha(3))
        .await?
    {
        bail!("Creating block {BLOCK_NAME} was rejected: {r}");
    }

    let gbid = ctx.blocks.get_block_gbid(volume, BLOCK_NAME).await?;
    let bricks = ctx.cluster.get_all_bricks(volume).await?;

    let out = ctx
        .blocks
        .block_delete(volume, BLOCK_NAME, &DeleteOptions::unlink(UnlinkStorage::No))
        .await?;
    if let Err(failure) = check_reply(&out) {
        bail!("Block {BLOCK_NAME} could not be deleted: {failure}");
    }

    let remaining = ctx.blocks.get_block_list(volume).await?;
    ensure!(
        remaining.is_none(),
        "Block list is not empty after deleting the block: {remaining:?}"
    );

    let brick = bricks
        .first()
        .with_context(|| format!("Volume {volume} has no bricks"))?;
    ensure!(
        ctx.cluster.block_store_contains(brick, &gbid).await?,
        "Backing file {gbid} was removed from {brick} although unlink-storage was no"
    );

    Ok(())
}
