//! `gluster-block ...` on the simulated cluster

use super::{BackingFile, CLI_FAILURE, Fault, SimBlock, SimState, fail, output};
use crate::cluster::CmdOutput;
use serde_json::{Map, Value, json};
use shared::parser::block_size;
use shared::{Gbid, Host};
use uuid::Uuid;

const ENOENT: i64 = 2;
const EIO: i64 = 5;
const EBUSY: i64 = 16;
const EEXIST: i64 = 17;
const EINVAL: i64 = 22;
const ENOTCONN: i64 = 107;
const EHOSTUNREACH: i64 = 113;

const IQN_PREFIX: &str = "iqn.2016-12.org.gluster-block";

fn success(reply: Value) -> CmdOutput {
    let mut reply = match reply {
        Value::Object(reply) => reply,
        _ => Map::new(),
    };
    reply.insert("RESULT".into(), "SUCCESS".into());

    output(0, format!("{}\n", Value::Object(reply)), "")
}

fn failure(err_code: i64, msg: impl Into<String>) -> CmdOutput {
    let reply = json!({"RESULT": "FAIL", "errCode": err_code, "errMsg": msg.into()});
    output(CLI_FAILURE, format!("{reply}\n"), "")
}

/// Splits `<volume>/<block>`.
fn split_target(target: &str) -> Option<(&str, &str)> {
    target
        .split_once('/')
        .filter(|(v, b)| !v.is_empty() && !b.is_empty() && !b.contains('/'))
}

fn portals(hosts: &[Host]) -> Vec<String> {
    hosts.iter().map(|h| format!("{h}:3260")).collect()
}

#[derive(Default)]
struct CreateArgs<'a> {
    ha: Option<u32>,
    auth: bool,
    storage: Option<&'a str>,
    hosts: Vec<&'a str>,
    size: Option<u64>,
}

/// Parses the arguments following `create <volume>/<block>`. Errors are usage errors.
fn parse_create_args<'a>(args: &[&'a str]) -> Result<CreateArgs<'a>, String> {
    let mut parsed = CreateArgs::default();
    let mut positional = vec![];

    let mut it = args.iter().copied();
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("'{arg}' option is incorrect"));

        match arg {
            "ha" => {
                let ha = value()?
                    .parse()
                    .ok()
                    .filter(|ha| *ha > 0)
                    .ok_or("'ha' option is incorrect")?;
                parsed.ha = Some(ha);
            }
            "auth" => {
                parsed.auth = match value()? {
                    "enable" => true,
                    "disable" => false,
                    _ => return Err("'auth' option is incorrect".into()),
                }
            }
            "prealloc" => {
                if !matches!(value()?, "full" | "no") {
                    return Err("'prealloc' option is incorrect".into());
                }
            }
            "storage" => parsed.storage = Some(value()?),
            "ring-buffer" => {
                value()?
                    .parse::<u32>()
                    .ok()
                    .filter(|rb| *rb <= 1024)
                    .ok_or("'ring-buffer' option is incorrect")?;
            }
            other => positional.push(other),
        }
    }

    match positional.as_slice() {
        [hosts] => parsed.hosts = hosts.split(',').collect(),
        [hosts, size] => {
            parsed.hosts = hosts.split(',').collect();
            parsed.size = Some(
                block_size::parse(size)
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("Incorrect size '{size}'"))?,
            );
        }
        _ => return Err("Inadequate arguments for create".into()),
    }

    if parsed.hosts.iter().any(|h| h.is_empty()) {
        return Err("Inadequate arguments for create".into());
    }

    if parsed.size.is_none() && parsed.storage.is_none() {
        return Err("Inadequate arguments for create".into());
    }

    Ok(parsed)
}

impl SimState {
    pub(super) fn gluster_block(&mut self, host: &Host, args: &[&str]) -> CmdOutput {
        if !self.hosts[host].is_active("gluster-blockd") {
            return fail(
                CLI_FAILURE,
                "Connection failed. Please check if gluster-block daemon is operational.",
            );
        }

        if !args.contains(&"--json-plain") {
            return fail(CLI_FAILURE, "only --json-plain output is simulated");
        }

        let args: Vec<&str> = args
            .iter()
            .copied()
            .filter(|a| *a != "--json-plain")
            .collect();

        match args.as_slice() {
            ["create", target, rest @ ..] => match split_target(target) {
                Some((volume, name)) => match parse_create_args(rest) {
                    Ok(create) => self.block_create(volume, name, create),
                    Err(usage) => fail(CLI_FAILURE, usage),
                },
                None => fail(CLI_FAILURE, format!("'{target}' is incorrect")),
            },
            ["list", volume] => self.block_list(volume),
            ["info", target] => match split_target(target) {
                Some((volume, name)) => self.block_info(volume, name),
                None => fail(CLI_FAILURE, format!("'{target}' is incorrect")),
            },
            ["modify", target, "auth", auth] => match (split_target(target), *auth) {
                (Some((volume, name)), "enable") => self.block_modify(volume, name, true),
                (Some((volume, name)), "disable") => self.block_modify(volume, name, false),
                (Some(_), _) => fail(CLI_FAILURE, "'auth' option is incorrect"),
                (None, _) => fail(CLI_FAILURE, format!("'{target}' is incorrect")),
            },
            ["delete", target, rest @ ..] => {
                let Some((volume, name)) = split_target(target) else {
                    return fail(CLI_FAILURE, format!("'{target}' is incorrect"));
                };

                let mut unlink = true;
                let mut force = false;
                let mut it = rest.iter();
                while let Some(arg) = it.next() {
                    match (*arg, it.as_slice().first().copied()) {
                        ("unlink-storage", Some("yes")) => unlink = true,
                        ("unlink-storage", Some("no")) => unlink = false,
                        ("unlink-storage", _) => {
                            return fail(CLI_FAILURE, "'unlink-storage' option is incorrect");
                        }
                        ("force", _) => {
                            force = true;
                            continue;
                        }
                        (other, _) => return fail(CLI_FAILURE, format!("unknown option '{other}'")),
                    }
                    it.next();
                }

                self.block_delete(volume, name, unlink, force)
            }
            [] => fail(CLI_FAILURE, "Usage: gluster-block <command> <volname[/blockname]> [<args>] [--json*]"),
            [other, ..] => fail(CLI_FAILURE, format!("unknown option '{other}'")),
        }
    }

    /// Checks that `host` can export blocks right now.
    fn is_block_host_up(&self, host: &str) -> bool {
        self.hosts
            .iter()
            .find(|(h, _)| h.as_str() == host)
            .is_some_and(|(_, h)| h.connected && !h.unreachable && h.is_active("gluster-blockd"))
    }

    fn block_create(&mut self, volume: &str, name: &str, args: CreateArgs) -> CmdOutput {
        let Some(vol) = self.volumes.get(volume) else {
            return failure(ENOENT, format!("volume {volume} does not exist"));
        };

        if vol.status != super::VolumeStatus::Started {
            return failure(ENOTCONN, format!("failed to connect to volume {volume}"));
        }

        if vol.blocks.contains_key(name) {
            return failure(EEXIST, format!("BLOCK with name: '{name}' already EXIST"));
        }

        let ha = args.ha.unwrap_or(1);
        if ha as usize > args.hosts.len() {
            return failure(
                EINVAL,
                format!(
                    "'ha' count {ha} is more than the number of servers {}",
                    args.hosts.len()
                ),
            );
        }

        let mut servers: Vec<Host> = vec![];
        for h in &args.hosts {
            match h.parse::<Host>() {
                Ok(host) if servers.contains(&host) => {
                    return failure(EINVAL, format!("duplicate server {host} in host list"));
                }
                Ok(host) if self.is_block_host_up(h) => servers.push(host),
                _ => return failure(EHOSTUNREACH, format!("host {h} is not reachable")),
            }
        }
        servers.truncate(ha as usize);

        let file = match args.storage {
            Some(storage) => {
                let Some(file) = vol.store.get(&Gbid::from(storage)).copied() else {
                    return failure(
                        ENOENT,
                        format!("storage file '{storage}' doesn't exist in volume {volume}"),
                    );
                };

                if let Some((user, _)) = vol
                    .blocks
                    .iter()
                    .find(|(_, b)| vol.store.get(&b.gbid) == Some(&file))
                {
                    return failure(
                        EBUSY,
                        format!("storage '{storage}' is in use by block '{user}'"),
                    );
                }

                Some(file)
            }
            None => None,
        };

        let add_link = !self.has_fault(Fault::ReuseWithoutLink);
        let Some(vol) = self.volumes.get_mut(volume) else {
            return failure(ENOENT, format!("volume {volume} does not exist"));
        };

        let file = match file {
            Some(i) => {
                if add_link {
                    vol.files[i].links += 1;
                }
                i
            }
            None => {
                vol.files.push(BackingFile {
                    size: args.size.unwrap_or_default(),
                    links: 2,
                });
                vol.files.len() - 1
            }
        };

        let gbid = Gbid::from(Uuid::new_v4().to_string());
        let password = match args.auth {
            true => Uuid::new_v4().to_string(),
            false => String::new(),
        };

        vol.store.insert(gbid.clone(), file);
        vol.blocks.insert(
            name.to_string(),
            SimBlock {
                gbid: gbid.clone(),
                size: vol.files[file].size,
                ha,
                servers: servers.clone(),
                password: password.clone(),
            },
        );

        let mut reply = json!({ "IQN": format!("{IQN_PREFIX}:{gbid}") });
        if args.auth {
            reply["USERNAME"] = gbid.to_string().into();
            reply["PASSWORD"] = password.into();
        }
        reply["PORTAL(S)"] = portals(&servers).into();

        success(reply)
    }

    fn block_list(&self, volume: &str) -> CmdOutput {
        let Some(vol) = self.volumes.get(volume) else {
            return failure(ENOENT, format!("volume {volume} does not exist"));
        };

        success(json!({ "blocks": vol.blocks.keys().collect::<Vec<_>>() }))
    }

    fn block_info(&self, volume: &str, name: &str) -> CmdOutput {
        let Some(block) = self.volumes.get(volume).and_then(|v| v.blocks.get(name)) else {
            return failure(
                ENOENT,
                format!("block with name {name} doesn't exist in the volume {volume}"),
            );
        };

        success(
            json!({
                "NAME": name,
                "VOLUME": volume,
                "GBID": block.gbid,
                "SIZE": block_size::format(block.size),
                "HA": block.ha,
                "PASSWORD": block.password,
                "EXPORTED ON": block.servers,
            }),
        )
    }

    fn block_modify(&mut self, volume: &str, name: &str, auth: bool) -> CmdOutput {
        let keep_password = !auth && self.has_fault(Fault::AuthDisableIgnored);
        let Some(block) = self
            .volumes
            .get_mut(volume)
            .and_then(|v| v.blocks.get_mut(name))
        else {
            return failure(
                ENOENT,
                format!("block with name {name} doesn't exist in the volume {volume}"),
            );
        };

        block.password = match auth {
            true => Uuid::new_v4().to_string(),
            false if keep_password => block.password.clone(),
            false => String::new(),
        };

        let mut reply = json!({ "IQN": format!("{IQN_PREFIX}:{}", block.gbid) });
        if auth {
            reply["USERNAME"] = block.gbid.to_string().into();
            reply["PASSWORD"] = block.password.clone().into();
        }
        reply["SUCCESSFUL ON"] = json!(block.servers);

        success(reply)
    }

    fn block_delete(
        &mut self,
        volume: &str,
        name: &str,
        unlink: bool,
        force: bool,
    ) -> CmdOutput {
        let Some(block) = self.volumes.get(volume).and_then(|v| v.blocks.get(name)) else {
            return failure(
                ENOENT,
                format!("block with name {name} doesn't exist in the volume {volume}"),
            );
        };

        let down: Vec<String> = block
            .servers
            .iter()
            .filter(|h| !self.is_block_host_up(h.as_str()))
            .map(ToString::to_string)
            .collect();

        if !down.is_empty() && !force {
            return failure(
                EHOSTUNREACH,
                format!("failed to delete block {name} on {}", down.join(" ")),
            );
        }

        if self.has_fault(Fault::BlockDeleteFails) {
            return failure(EIO, format!("failed to delete block {name}: Input/output error"));
        }

        let unlink = unlink || self.has_fault(Fault::UnlinkIgnored);
        let Some(vol) = self.volumes.get_mut(volume) else {
            return failure(ENOENT, format!("volume {volume} does not exist"));
        };
        let Some(block) = vol.blocks.remove(name) else {
            return failure(ENOENT, format!("block {name} vanished"));
        };

        if unlink {
            if let Some(file) = vol.store.remove(&block.gbid) {
                vol.files[file].links = vol.files[file].links.saturating_sub(1);
            }
        }

        success(json!({ "SUCCESSFUL ON": block.servers }))
    }
}

#[cfg(test)]
mod test {
    use super::super::{Fault, SimCluster};
    use crate::block::{
        AuthMode, BlockClient, BlockOptions, CreateOutcome, DeleteOptions, Rejection,
        UnlinkStorage,
    };
    use crate::cluster::{ClusterDriver, Executor, RemoteCommand, VolumeSpec};
    use shared::Host;

    fn host(s: &str) -> Host {
        s.parse().unwrap()
    }

    async fn setup() -> (SimCluster, BlockClient<SimCluster>, Vec<Host>) {
        let servers = vec![host("s1"), host("s2"), host("s3")];
        let sim = SimCluster::new(host("s1"), &servers);

        ClusterDriver::new(sim.clone(), host("s1"))
            .setup_volume(&VolumeSpec {
                name: "vol".into(),
                servers: servers.clone(),
                replica: Some(3),
                brick_root: "/bricks".into(),
            })
            .await
            .unwrap();

        (sim.clone(), BlockClient::new(sim, host("s1")), servers)
    }

    fn rejection(outcome: CreateOutcome) -> Rejection {
        match outcome {
            CreateOutcome::Rejected(r) => r,
            CreateOutcome::Created => panic!("creation was expected to be rejected"),
        }
    }

    #[tokio::test]
    async fn create_and_inspect() {
        let (_, c, servers) = setup().await;

        let outcome = c
            .setup_block("vol", "b1", &servers[..2], "1GiB", &BlockOptions::with_ha(2))
            .await
            .unwrap();
        assert!(outcome.is_created());

        assert!(c.if_block_exists("vol", "b1").await.unwrap());
        assert!(!c.if_block_exists("vol", "b2").await.unwrap());

        let info = c.get_block_info("vol", "b1").await.unwrap();
        assert_eq!(info.size, "1.0 GiB");
        assert_eq!(info.ha.get(), 2);
        assert_eq!(info.exported_on, servers[..2]);
        assert!(info.password.is_empty());

        assert!(
            c.validate_block_info("vol", "b1", &[host("s2"), host("s1")], "1GiB", 2)
                .await
                .unwrap()
        );
        assert!(
            !c.validate_block_info("vol", "b1", &servers[..2], "2GiB", 2)
                .await
                .unwrap()
        );
        assert!(
            !c.validate_block_info("vol", "b1", &servers[1..], "1.0 GiB", 2)
                .await
                .unwrap()
        );

        // names are unique per volume
        let outcome = c
            .setup_block("vol", "b1", &servers[..1], "1GiB", &BlockOptions::with_ha(1))
            .await
            .unwrap();
        let Rejection::Cli(failure) = rejection(outcome) else {
            panic!("expected a CLI failure");
        };
        assert_eq!(failure.err_code, Some(super::EEXIST));
    }

    #[tokio::test]
    async fn cli_validation() {
        let (sim, c, servers) = setup().await;

        let outcome = c
            .setup_block(
                "vol",
                "b1",
                &servers[..2],
                "1GiB",
                &BlockOptions::with_ha(2).auth(AuthMode::Other("yes-no".into())),
            )
            .await
            .unwrap();
        let Rejection::Cli(failure) = rejection(outcome) else {
            panic!("expected a CLI failure");
        };
        assert_eq!(failure.message, "'auth' option is incorrect");
        assert!(sim.block_names("vol").await.is_empty());

        // bypassing the client checks
        let out = sim
            .run(
                &host("s1"),
                &RemoteCommand::new("gluster-block").args([
                    "create",
                    "vol/b1",
                    "ha",
                    "3",
                    "s1,s2",
                    "1GiB",
                    "--json-plain",
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, super::CLI_FAILURE);
        assert!(out.stdout.contains(r#""errCode":22"#));

        let out = sim
            .run(
                &host("s1"),
                &RemoteCommand::new("gluster-block").args(["create", "vol/b1", "s1", "--json-plain"]),
            )
            .await
            .unwrap();
        assert!(out.stderr.contains("Inadequate arguments"));

        let outcome = c
            .setup_block("vol", "b1", &[host("s9")], "1GiB", &BlockOptions::with_ha(1))
            .await
            .unwrap();
        assert!(!outcome.is_created());
    }

    #[tokio::test]
    async fn modify_auth() {
        let (_, c, servers) = setup().await;

        c.setup_block("vol", "b1", &servers, "2GiB", &BlockOptions::with_ha(3))
            .await
            .unwrap();

        let out = c.block_modify("vol", "b1", &AuthMode::Enable).await.unwrap();
        assert!(out.success());
        let first = c.get_block_info("vol", "b1").await.unwrap().password;
        assert!(!first.is_empty());

        c.block_modify("vol", "b1", &AuthMode::Enable).await.unwrap();
        assert_ne!(c.get_block_info("vol", "b1").await.unwrap().password, first);

        c.block_modify("vol", "b1", &AuthMode::Disable).await.unwrap();
        assert!(c.get_block_info("vol", "b1").await.unwrap().password.is_empty());

        let out = c.block_modify("vol", "nope", &AuthMode::Enable).await.unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn storage_reuse() {
        let (sim, c, servers) = setup().await;

        c.setup_block("vol", "b1", &servers, "1GiB", &BlockOptions::with_ha(3))
            .await
            .unwrap();
        let gbid = c.get_block_gbid("vol", "b1").await.unwrap();
        assert_eq!(sim.link_count("vol", &gbid).await, Some(2));

        // in use by b1
        let outcome = c
            .setup_block("vol", "b2", &servers[..2], "", &BlockOptions::with_ha(2).storage(gbid.clone()))
            .await
            .unwrap();
        assert!(!outcome.is_created());

        let out = c
            .block_delete("vol", "b1", &DeleteOptions::unlink(UnlinkStorage::No))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(sim.link_count("vol", &gbid).await, Some(2));

        let outcome = c
            .setup_block("vol", "b1", &servers[..2], "", &BlockOptions::with_ha(2).storage(gbid.clone()))
            .await
            .unwrap();
        assert!(outcome.is_created());
        assert_eq!(sim.link_count("vol", &gbid).await, Some(3));

        let info = c.get_block_info("vol", "b1").await.unwrap();
        assert_ne!(info.gbid, gbid);
        assert_eq!(info.size, "1.0 GiB");
        assert_eq!(sim.file_size("vol", &info.gbid).await, Some(1 << 30));

        c.block_delete("vol", "b1", &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(sim.link_count("vol", &info.gbid).await, None);
        assert_eq!(sim.link_count("vol", &gbid).await, Some(2));
    }

    #[tokio::test]
    async fn delete_needs_servers_unless_forced() {
        let (sim, c, servers) = setup().await;

        c.setup_block("vol", "b1", &servers, "1GiB", &BlockOptions::with_ha(3))
            .await
            .unwrap();
        sim.stop_service(&host("s3"), "gluster-blockd").await;

        let out = c
            .block_delete("vol", "b1", &DeleteOptions::default())
            .await
            .unwrap();
        assert!(!out.success());
        assert!(c.if_block_exists("vol", "b1").await.unwrap());

        let out = c
            .block_delete(
                "vol",
                "b1",
                &DeleteOptions {
                    unlink_storage: None,
                    force: true,
                },
            )
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(c.get_block_list("vol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_output_only() {
        let (sim, _, _) = setup().await;

        let out = sim
            .run(
                &host("s1"),
                &RemoteCommand::new("gluster-block").args(["list", "vol"]),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, super::CLI_FAILURE);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn injected_faults() {
        let (sim, c, servers) = setup().await;

        c.setup_block("vol", "b1", &servers, "1GiB", &BlockOptions::with_ha(3))
            .await
            .unwrap();
        let gbid = c.get_block_gbid("vol", "b1").await.unwrap();

        sim.inject(Fault::AuthDisableIgnored).await;
        c.block_modify("vol", "b1", &AuthMode::Enable).await.unwrap();
        let out = c.block_modify("vol", "b1", &AuthMode::Disable).await.unwrap();
        assert!(out.success());
        assert!(!c.get_block_info("vol", "b1").await.unwrap().password.is_empty());

        sim.inject(Fault::UnlinkIgnored).await;
        let out = c
            .block_delete("vol", "b1", &DeleteOptions::unlink(UnlinkStorage::No))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(sim.link_count("vol", &gbid).await, None);

        c.setup_block("vol", "b2", &servers, "1GiB", &BlockOptions::with_ha(3))
            .await
            .unwrap();
        let gbid = c.get_block_gbid("vol", "b2").await.unwrap();

        sim.inject(Fault::BlockDeleteFails).await;
        let out = c
            .block_delete("vol", "b2", &DeleteOptions::default())
            .await
            .unwrap();
        assert!(!out.success());
        assert!(out.stdout.contains(r#""errCode":5"#));
        assert_eq!(sim.link_count("vol", &gbid).await, Some(2));
        assert_eq!(sim.block_names("vol").await, ["b2"]);
    }

    #[tokio::test]
    async fn daemon_down_on_mnode() {
        let (sim, c, _) = setup().await;

        sim.stop_service(&host("s1"), "gluster-blockd").await;
        let err = c.get_block_list("vol").await.unwrap_err();
        assert!(format!("{err:#}").contains("gluster-block daemon is operational"));
    }
}
