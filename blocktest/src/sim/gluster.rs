//! `gluster --mode=script ...` on the simulated cluster

use super::{Fault, SimState, SimVolume, VolumeStatus, fail, ok, output};
use crate::cluster::CmdOutput;
use shared::Host;
use std::collections::BTreeMap;
use std::fmt::Write;
use uuid::Uuid;

/// Options applied by `volume set <vol> group gluster-block`
const GLUSTER_BLOCK_GROUP: [(&str, &str); 12] = [
    ("performance.quick-read", "off"),
    ("performance.read-ahead", "off"),
    ("performance.io-cache", "off"),
    ("performance.stat-prefetch", "off"),
    ("performance.open-behind", "off"),
    ("performance.readdir-ahead", "off"),
    ("performance.strict-o-direct", "on"),
    ("network.remote-dio", "disable"),
    ("cluster.eager-lock", "disable"),
    ("cluster.quorum-type", "auto"),
    ("features.shard", "on"),
    ("features.shard-block-size", "64MB"),
];

impl SimState {
    pub(super) fn gluster(&mut self, host: &Host, args: &[&str]) -> CmdOutput {
        if !self.hosts[host].is_active("glusterd") {
            return fail(
                1,
                "Connection failed. Please check if gluster daemon is operational.",
            );
        }

        let args = match args {
            ["--mode=script", rest @ ..] => rest,
            rest => rest,
        };

        match args {
            ["pool", "list"] => self.pool_list(host),
            ["volume", "list"] => self.volume_list(),
            ["volume", "info", name] => self.volume_info(name),
            ["volume", "create", name, rest @ ..] => self.volume_create(name, rest),
            ["volume", "start", name] => self.volume_start(name),
            ["volume", "stop", name, ..] => self.volume_stop(name),
            ["volume", "delete", name] => self.volume_delete(name),
            ["volume", "set", name, "group", group] => self.volume_set_group(name, group),
            ["volume", "set", name, key, value] => match self.volumes.get_mut(*name) {
                Some(vol) => {
                    vol.options.insert(key.to_string(), value.to_string());
                    ok("volume set: success\n")
                }
                None => fail(1, format!("volume set: failed: Volume {name} does not exist")),
            },
            _ => fail(1, format!("unrecognized command: {}", args.join(" "))),
        }
    }

    fn pool_list(&self, local: &Host) -> CmdOutput {
        let mut out = String::from("UUID\t\t\t\t\tHostname\tState\n");

        for (host, h) in self.hosts.iter().filter(|(h, _)| *h != local) {
            let state = if h.connected {
                "Connected"
            } else {
                "Disconnected"
            };
            let _ = writeln!(out, "{}\t{host}\t{state} ", h.uuid);
        }

        let _ = writeln!(out, "{}\tlocalhost\tConnected ", self.hosts[local].uuid);

        ok(out)
    }

    fn volume_list(&self) -> CmdOutput {
        if self.volumes.is_empty() {
            return ok("No volumes present in cluster\n");
        }

        ok(self.volumes.keys().map(|v| format!("{v}\n")).collect::<String>())
    }

    fn volume_info(&self, name: &str) -> CmdOutput {
        let Some(vol) = self.volumes.get(name) else {
            return fail(1, format!("Volume {name} does not exist"));
        };

        let (volume_type, layout) = match vol.replica {
            Some(r) if r > 1 => (
                "Replicate",
                format!("{} x {r} = {}", vol.bricks.len() as u32 / r, vol.bricks.len()),
            ),
            _ => ("Distribute", vol.bricks.len().to_string()),
        };

        let status = match vol.status {
            VolumeStatus::Created => "Created",
            VolumeStatus::Started => "Started",
            VolumeStatus::Stopped => "Stopped",
        };

        let mut out = format!(
            "\nVolume Name: {name}\nType: {volume_type}\nVolume ID: {}\nStatus: {status}\n\
            Snapshot Count: 0\nNumber of Bricks: {layout}\nTransport-type: tcp\nBricks:\n",
            vol.id
        );

        for (i, (host, path)) in vol.bricks.iter().enumerate() {
            let _ = writeln!(out, "Brick{}: {host}:{path}", i + 1);
        }

        if !vol.options.is_empty() {
            out.push_str("Options Reconfigured:\n");
            for (k, v) in &vol.options {
                let _ = writeln!(out, "{k}: {v}");
            }
        }

        ok(out)
    }

    fn volume_create(&mut self, name: &str, args: &[&str]) -> CmdOutput {
        let failed = |msg: String| fail(1, format!("volume create: {name}: failed: {msg}"));

        if self.volumes.contains_key(name) {
            return failed(format!("Volume {name} already exists"));
        }

        let (replica, bricks) = match args {
            ["replica", count, rest @ ..] => match count.parse::<u32>() {
                Ok(r) if r > 0 => (Some(r), rest),
                _ => return fail(1, format!("Invalid replica count {count}")),
            },
            rest => (None, rest),
        };
        let bricks = bricks.strip_suffix(&["force"]).unwrap_or(bricks);

        if bricks.is_empty() {
            return fail(1, "Usage: volume create <NEW-VOLNAME> [replica <COUNT>] <NEW-BRICK>... [force]");
        }

        if let Some(r) = replica {
            if bricks.len() % r as usize != 0 {
                return failed(format!(
                    "number of bricks is not a multiple of replica count {r}"
                ));
            }
        }

        let mut parsed: Vec<(Host, String)> = vec![];
        for brick in bricks {
            let Some((host, path)) = brick.split_once(':') else {
                return fail(1, format!("wrong brick type: {brick}, use <HOSTNAME>:<export-dir-abs-path>"));
            };

            let Some((host, h)) = self.hosts.iter().find(|(h, _)| h.as_str() == host) else {
                return failed(format!("Host {host} is not in 'Peer in Cluster' state"));
            };

            if !h.connected {
                return failed(format!("Host {host} is not in 'Peer in Cluster' state"));
            }

            if parsed.iter().any(|(h2, p2)| h2 == host && p2 == path) {
                return failed(format!("Brick: {brick} not available. Brick may be containing or be contained by an existing brick."));
            }

            parsed.push((host.clone(), path.to_string()));
        }

        for (host, path) in &parsed {
            self.host_mut(host).dirs.insert(path.clone());
        }

        self.volumes.insert(
            name.to_string(),
            SimVolume {
                id: Uuid::new_v4(),
                replica,
                bricks: parsed,
                status: VolumeStatus::Created,
                options: BTreeMap::new(),
                files: vec![],
                store: BTreeMap::new(),
                blocks: BTreeMap::new(),
            },
        );

        ok(format!(
            "volume create: {name}: success: please start the volume to access data\n"
        ))
    }

    fn volume_start(&mut self, name: &str) -> CmdOutput {
        let Some(vol) = self.volumes.get_mut(name) else {
            return fail(1, format!("volume start: {name}: failed: Volume {name} does not exist"));
        };

        if vol.status == VolumeStatus::Started {
            return fail(1, format!("volume start: {name}: failed: Volume {name} already started"));
        }

        vol.status = VolumeStatus::Started;
        ok(format!("volume start: {name}: success\n"))
    }

    fn volume_stop(&mut self, name: &str) -> CmdOutput {
        let Some(vol) = self.volumes.get_mut(name) else {
            return fail(1, format!("volume stop: {name}: failed: Volume {name} does not exist"));
        };

        if vol.status != VolumeStatus::Started {
            return fail(
                1,
                format!("volume stop: {name}: failed: Volume {name} is not in the started state"),
            );
        }

        vol.status = VolumeStatus::Stopped;
        ok(format!("volume stop: {name}: success\n"))
    }

    fn volume_delete(&mut self, name: &str) -> CmdOutput {
        match self.volumes.get(name) {
            None => fail(1, format!("volume delete: {name}: failed: Volume {name} does not exist")),
            Some(vol) if vol.status == VolumeStatus::Started => fail(
                1,
                format!(
                    "volume delete: {name}: failed: Volume {name} has been started.\
                    Volume needs to be stopped before deletion."
                ),
            ),
            Some(_) if self.has_fault(Fault::VolumeDeleteFails) => fail(
                1,
                format!("volume delete: {name}: failed: Commit failed on localhost"),
            ),
            Some(_) => {
                self.volumes.remove(name);
                ok(format!("volume delete: {name}: success\n"))
            }
        }
    }

    fn volume_set_group(&mut self, name: &str, group: &str) -> CmdOutput {
        let Some(vol) = self.volumes.get_mut(name) else {
            return fail(1, format!("volume set: failed: Volume {name} does not exist"));
        };

        if group != "gluster-block" {
            return output(
                1,
                "",
                format!(
                    "volume set: failed: Unable to open file '/var/lib/glusterd/groups/{group}'. \
                    Error: No such file or directory\n"
                ),
            );
        }

        for (k, v) in GLUSTER_BLOCK_GROUP {
            vol.options.insert(k.to_string(), v.to_string());
        }

        ok("volume set: success\n")
    }
}

#[cfg(test)]
mod test {
    use super::super::SimCluster;
    use crate::cluster::{ClusterDriver, VolumeSpec};
    use shared::Host;

    fn host(s: &str) -> Host {
        s.parse().unwrap()
    }

    fn setup() -> (SimCluster, ClusterDriver<SimCluster>, VolumeSpec) {
        let servers = vec![host("s1"), host("s2"), host("s3")];
        let sim = SimCluster::new(host("s1"), &servers);
        let driver = ClusterDriver::new(sim.clone(), host("s1"));
        let spec = VolumeSpec {
            name: "testvol".into(),
            servers,
            replica: Some(3),
            brick_root: "/bricks".into(),
        };

        (sim, driver, spec)
    }

    #[tokio::test]
    async fn volume_lifecycle() {
        let (sim, driver, spec) = setup();

        assert!(driver.volume_info("testvol").await.unwrap().is_none());
        assert!(driver.volume_list().await.unwrap().is_empty());

        driver.setup_volume(&spec).await.unwrap();
        let info = driver.volume_info("testvol").await.unwrap().unwrap();
        assert!(info.is_started());
        assert_eq!(info.volume_type, "Replicate");
        assert_eq!(info.bricks, spec.bricks());
        assert_eq!(driver.volume_list().await.unwrap(), ["testvol"]);

        // setting up again reuses the volume
        driver.setup_volume(&spec).await.unwrap();
        assert_eq!(sim.commands_of("mkdir").await.len(), 3);

        driver.set_volume_group("testvol", "gluster-block").await.unwrap();
        assert_eq!(
            sim.volume_option("testvol", "features.shard").await.as_deref(),
            Some("on")
        );
        assert!(driver.set_volume_group("testvol", "nonsense").await.is_err());

        driver.cleanup_volume("testvol").await.unwrap();
        assert!(!sim.volume_exists("testvol").await);
        // cleaning up twice is fine
        driver.cleanup_volume("testvol").await.unwrap();
    }

    #[tokio::test]
    async fn peers() {
        let (sim, driver, spec) = setup();

        assert!(driver.validate_peers_are_connected(&spec.servers).await.unwrap());

        sim.disconnect_peer(&host("s3")).await;
        assert!(!driver.validate_peers_are_connected(&spec.servers).await.unwrap());

        // bricks on disconnected peers can't be used
        assert!(driver.setup_volume(&spec).await.is_err());
        assert!(!sim.volume_exists("testvol").await);
    }

    #[tokio::test]
    async fn services() {
        let (sim, driver, _) = setup();

        driver.restart_service(&host("s2"), "gluster-blockd").await.unwrap();
        assert!(driver.is_service_active(&host("s2"), "gluster-blockd").await.unwrap());

        sim.fail_service_restart(&host("s2")).await;
        assert!(driver.restart_service(&host("s2"), "gluster-blockd").await.is_err());
        assert!(!driver.is_service_active(&host("s2"), "gluster-blockd").await.unwrap());

        sim.stop_service(&host("s1"), "glusterd").await;
        assert!(driver.volume_list().await.is_err());
    }
}
