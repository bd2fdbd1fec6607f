//! Parsing of `gluster-block ... --json-plain` replies

use crate::cluster::CmdOutput;
use crate::error::CliFailure;
use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::{Gbid, HaCount, Host};
use std::collections::BTreeMap;

/// The status fields every reply carries
#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(rename = "RESULT")]
    result: Option<String>,
    #[serde(rename = "errCode")]
    err_code: Option<i64>,
    #[serde(rename = "errMsg")]
    err_msg: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Checks exit code and `RESULT` field of a reply.
///
/// Argument errors are reported by the CLI as plain text on stderr, so the output is not
/// required to be JSON.
pub fn check(output: &CmdOutput) -> Result<(), CliFailure> {
    let status: Status = serde_json::from_str(output.stdout.trim()).unwrap_or_default();

    let result_failed = status.result.as_deref().is_some_and(|r| r != "SUCCESS");
    if output.success() && !result_failed {
        return Ok(());
    }

    let message = status
        .err_msg
        .as_deref()
        .and_then(non_empty)
        .or_else(|| non_empty(&output.stderr))
        .or_else(|| non_empty(&output.stdout))
        .unwrap_or_else(|| "no error message".to_string());

    Err(CliFailure {
        exit_code: output.exit_code,
        err_code: status.err_code,
        message,
    })
}

/// Checks the reply and deserializes it into `T`.
pub(super) fn parse<T: DeserializeOwned>(output: &CmdOutput) -> Result<T> {
    check(output)?;

    serde_json::from_str(output.stdout.trim())
        .with_context(|| format!("Unexpected gluster-block reply {:?}", output.stdout))
}

#[derive(Debug, Deserialize)]
pub(super) struct ListReply {
    #[serde(default)]
    pub blocks: Vec<String>,
}

/// Block attributes as reported by `gluster-block info`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BlockInfo {
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "VOLUME")]
    pub volume: String,
    #[serde(rename = "GBID")]
    pub gbid: Gbid,
    /// Human readable size like `"1.0 GiB"`
    #[serde(rename = "SIZE")]
    pub size: String,
    #[serde(rename = "HA")]
    pub ha: HaCount,
    /// Empty if authentication is disabled
    #[serde(rename = "PASSWORD", default)]
    pub password: String,
    #[serde(rename = "EXPORTED ON", default)]
    pub exported_on: Vec<Host>,
    #[serde(rename = "ENCOUNTERED FAILURES ON", default)]
    pub failed_on: Vec<Host>,
}

impl BlockInfo {
    /// The attributes as flat key/value map, keyed like the CLI prints them.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([
            ("NAME".to_string(), self.name.clone()),
            ("VOLUME".to_string(), self.volume.clone()),
            ("GBID".to_string(), self.gbid.to_string()),
            ("SIZE".to_string(), self.size.clone()),
            ("HA".to_string(), self.ha.to_string()),
            ("PASSWORD".to_string(), self.password.clone()),
            ("EXPORTED ON".to_string(), self.exported_on.iter().join(" ")),
        ]);

        if !self.failed_on.is_empty() {
            map.insert(
                "ENCOUNTERED FAILURES ON".to_string(),
                self.failed_on.iter().join(" "),
            );
        }

        map
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn out(exit_code: i32, stdout: &str, stderr: &str) -> CmdOutput {
        CmdOutput {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn check_replies() {
        check(&out(0, r#"{"RESULT":"SUCCESS"}"#, "")).unwrap();
        // some subcommands print nothing on success
        check(&out(0, "", "")).unwrap();

        let err = check(&out(
            1,
            r#"{"RESULT":"FAIL","errCode":17,"errMsg":"BLOCK with name: 'b1' already EXIST"}"#,
            "",
        ))
        .unwrap_err();
        assert_eq!(err.err_code, Some(17));
        assert_eq!(err.message, "BLOCK with name: 'b1' already EXIST");

        // failure reported in the body only
        let err = check(&out(0, r#"{"RESULT":"FAIL","errCode":2,"errMsg":""}"#, "")).unwrap_err();
        assert_eq!(err.exit_code, 0);
        assert_eq!(err.message, r#"{"RESULT":"FAIL","errCode":2,"errMsg":""}"#);

        let err = check(&out(255, "", "'auth' option is incorrect\n")).unwrap_err();
        assert_eq!(err.err_code, None);
        assert_eq!(err.message, "'auth' option is incorrect");
    }

    #[test]
    fn info_reply() {
        let reply = r#"{ "NAME":"block_1", "VOLUME":"testvol",
            "GBID":"6b7d1f5e-4f2a-4c36-9d4f-3f4b2c1a0e9d", "SIZE":"1.0 GiB", "HA":2,
            "PASSWORD":"", "EXPORTED ON":[ "10.0.0.1", "10.0.0.2" ], "RESULT":"SUCCESS" }"#;

        let info: BlockInfo = parse(&out(0, reply, "")).unwrap();
        assert_eq!(info.name, "block_1");
        assert_eq!(info.ha, HaCount::from(2));
        assert_eq!(info.size, "1.0 GiB");
        assert!(info.failed_on.is_empty());

        let attrs = info.attributes();
        assert_eq!(attrs["PASSWORD"], "");
        assert_eq!(attrs["EXPORTED ON"], "10.0.0.1 10.0.0.2");
        assert!(!attrs.contains_key("ENCOUNTERED FAILURES ON"));
    }

    #[test]
    fn list_reply() {
        let list: ListReply =
            parse(&out(0, r#"{"blocks":["a","b"],"RESULT":"SUCCESS"}"#, "")).unwrap();
        assert_eq!(list.blocks, ["a", "b"]);

        let list: ListReply = parse(&out(0, r#"{"RESULT":"SUCCESS"}"#, "")).unwrap();
        assert!(list.blocks.is_empty());

        assert!(parse::<ListReply>(&out(0, "*Nil*", "")).is_err());
    }
}
