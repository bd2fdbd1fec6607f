//! Scenarios of the `create` suite

use super::{BLOCK_NAME, SuiteContext};
use crate::block::{
    AuthMode, BlockOptions, CreateOutcome, DeleteOptions, Rejection, UnlinkStorage, check_reply,
};
use crate::cluster::Executor;
use anyhow::{Context, Result, bail, ensure};
use shared::{HaCount, Host};

/// Creates [BLOCK_NAME] and checks it is listed and reports the expected attributes.
async fn create_and_validate<E: Executor>(
    ctx: &SuiteContext<E>,
    servers: &[Host],
    size: &str,
    options: &BlockOptions,
    expected_size: &str,
) -> Result<()> {
    let volume = ctx.volume_name();

    if let CreateOutcome::Rejected(rejection) = ctx
        .blocks
        .setup_block(volume, BLOCK_NAME, servers, size, options)
        .await?
    {
        bail!("Creating block {BLOCK_NAME} was rejected: {rejection}");
    }

    ensure!(
        ctx.blocks.if_block_exists(volume, BLOCK_NAME).await?,
        "Block {BLOCK_NAME} is not listed in volume {volume}"
    );

    let ha = options.ha.map_or(1, HaCount::get);
    ensure!(
        ctx.blocks
            .validate_block_info(volume, BLOCK_NAME, servers, expected_size, ha)
            .await?,
        "Block info of {BLOCK_NAME} doesn't match the requested attributes"
    );

    Ok(())
}

/// Tries to create [BLOCK_NAME], expecting the creation to be refused.
async fn expect_rejected<E: Executor>(
    ctx: &SuiteContext<E>,
    servers: &[Host],
    size: &str,
    options: &BlockOptions,
) -> Result<Rejection> {
    let volume = ctx.volume_name();

    let rejection = match ctx
        .blocks
        .setup_block(volume, BLOCK_NAME, servers, size, options)
        .await?
    {
        CreateOutcome::Created => bail!("Block creation succeeded while it wasn't supposed to"),
        CreateOutcome::Rejected(r) => r,
    };

    log::info!("Block creation was rejected as expected: {rejection}");

    ensure!(
        !ctx.blocks.if_block_exists(volume, BLOCK_NAME).await?,
        "Block {BLOCK_NAME} exists although its creation was rejected"
    );

    Ok(rejection)
}

pub(super) async fn ha<E: Executor>(ctx: &mut SuiteContext<E>, ha: u32) -> Result<()> {
    let servers = ctx.sample_servers(ha as usize)?;
    create_and_validate(ctx, &servers, "1GiB", &BlockOptions::with_ha(ha), "1.0 GiB").await
}

pub(super) async fn auth_enable<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    create_and_validate(
        ctx,
        &servers,
        "1GiB",
        &BlockOptions::with_ha(3).auth(AuthMode::Enable),
        "1.0 GiB",
    )
    .await?;

    let info = ctx
        .blocks
        .get_block_info(ctx.volume_name(), BLOCK_NAME)
        .await?;
    ensure!(
        !info.password.is_empty(),
        "Block {BLOCK_NAME} was created with auth enabled but has no password"
    );

    Ok(())
}

/// `size` must be reported as 1 KiB
pub(super) async fn size<E: Executor>(ctx: &mut SuiteContext<E>, size: &str) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    create_and_validate(ctx, &servers, size, &BlockOptions::with_ha(3), "1.0 KiB").await
}

pub(super) async fn missing_size<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    expect_rejected(ctx, &servers, "", &BlockOptions::with_ha(3)).await?;

    Ok(())
}

/// Requests `ha` with only `count` servers.
pub(super) async fn ha_mismatch<E: Executor>(
    ctx: &mut SuiteContext<E>,
    ha: u32,
    count: usize,
) -> Result<()> {
    let servers = ctx.sample_servers(count)?;
    expect_rejected(ctx, &servers, "1GiB", &BlockOptions::with_ha(ha)).await?;

    Ok(())
}

/// An auth value other than enable/disable must be refused by `gluster-block` itself.
pub(super) async fn invalid_auth_value<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(2)?;
    let rejection = expect_rejected(
        ctx,
        &servers,
        "1GiB",
        &BlockOptions::with_ha(2).auth(AuthMode::Other("yes-no".into())),
    )
    .await?;

    ensure!(
        matches!(rejection, Rejection::Cli(_)),
        "Expected gluster-block to reject the auth value, got: {rejection}"
    );

    Ok(())
}

/// Deletes a block keeping its storage, then creates a new block on that storage. This must add
/// exactly one hard link to the backing file.
pub(super) async fn unlink_storage_reuse<E: Executor>(ctx: &mut SuiteContext<E>) -> Result<()> {
    let servers = ctx.sample_servers(3)?;
    create_and_validate(ctx, &servers, "1GiB", &BlockOptions::with_ha(3), "1.0 GiB").await?;

    let volume = ctx.volume_name();
    let gbid = ctx.blocks.get_block_gbid(volume, BLOCK_NAME).await?;

    let bricks = ctx.cluster.get_all_bricks(volume).await?;
    let brick = bricks
        .first()
        .with_context(|| format!("Volume {volume} has no bricks"))?;

    let Some(links) = ctx.cluster.hard_link_count(brick, &gbid).await? else {
        bail!("Backing file {gbid} not found on brick {brick}");
    };

    let out = ctx
        .blocks
        .block_delete(volume, BLOCK_NAME, &DeleteOptions::unlink(UnlinkStorage::No))
        .await?;
    if let Err(failure) = check_reply(&out) {
        bail!("Block {BLOCK_NAME} could not be deleted: {failure}");
    }

    ensure!(
        ctx.cluster.block_store_contains(brick, &gbid).await?,
        "Backing file {gbid} was removed although unlink-storage was no"
    );

    let reuse_servers = ctx.sample_servers(2)?;
    let volume = ctx.volume_name();

    match ctx
        .blocks
        .setup_block(
            volume,
            BLOCK_NAME,
            &reuse_servers,
            "",
            &BlockOptions::with_ha(2).storage(gbid.clone()),
        )
        .await?
    {
        CreateOutcome::Created => {}
        CreateOutcome::Rejected(r) => bail!("Creating a block on storage {gbid} was rejected: {r}"),
    }

    let new_links = ctx.cluster.hard_link_count(brick, &gbid).await?;
    ensure!(
        new_links == Some(links + 1),
        "Hard link count of {gbid} is {new_links:?}, expected {}",
        links + 1
    );

    Ok(())
}
