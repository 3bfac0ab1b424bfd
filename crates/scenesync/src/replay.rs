//! JSON-lines request replay.
//!
//! Each input line is `{"route", "idempotencyKey"?, "body"?}`; each output
//! line is `{"route", "status", "body"}`. Blank lines are skipped. A line that
//! does not parse yields a 400 reply and replay continues.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use scenesync_core::{tree::ResyncRecord, Engine, InstancePath, LockOwner, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    Command,
    Commands,
    Snapshot,
    Schema,
    Locks,
    Acquire,
    Release,
    ReplaceAll,
    PendingChanges,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayRequest {
    route: Route,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Serialize)]
struct ReplayReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<Route>,
    status: u16,
    body: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaBody {
    #[serde(default)]
    class_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AcquireBody {
    owner: LockOwner,
    paths: Vec<InstancePath>,
}

#[derive(Debug, Deserialize)]
struct ReleaseBody {
    owner: LockOwner,
}

#[derive(Debug, Deserialize)]
struct ReplaceAllBody {
    instances: Vec<ResyncRecord>,
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    Response::new(400, json!({ "success": false, "status": 400, "error": message.to_string() }))
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: Value) -> std::result::Result<T, Response> {
    serde_json::from_value(body).map_err(|err| bad_request(format!("invalid body: {err}")))
}

/// Route one request to the engine.
pub async fn handle(engine: &Engine, route: Route, key: Option<&str>, body: Value) -> Response {
    match route {
        Route::Command => engine.command(body, key).await,
        Route::Commands => engine.commands(body, key).await,
        Route::Snapshot => Response::from_body(200, &engine.snapshot().await),
        Route::Schema => {
            let body = if body.is_null() { json!({}) } else { body };
            match parse_body::<SchemaBody>(body) {
                Ok(body) => {
                    Response::from_body(200, &engine.schema(body.class_name.as_deref()).await)
                }
                Err(reply) => reply,
            }
        }
        Route::Locks => Response::from_body(200, &engine.locks().await),
        Route::Acquire => match parse_body::<AcquireBody>(body) {
            Ok(body) => match engine.acquire_locks(&body.owner, &body.paths).await {
                Ok(leases) => Response::ok(json!({ "success": true, "leases": leases })),
                Err(conflict) => Response::new(
                    423,
                    json!({ "success": false, "status": 423, "conflict": conflict }),
                ),
            },
            Err(reply) => reply,
        },
        Route::Release => match parse_body::<ReleaseBody>(body) {
            Ok(body) => {
                let released = engine.release_locks(&body.owner).await;
                Response::ok(json!({ "success": true, "released": released }))
            }
            Err(reply) => reply,
        },
        Route::ReplaceAll => match parse_body::<ReplaceAllBody>(body) {
            Ok(body) => Response::from_body(200, &engine.replace_all(body.instances).await),
            Err(reply) => reply,
        },
        Route::PendingChanges => {
            let changes = engine.take_pending_changes().await;
            Response::ok(json!({ "changes": changes }))
        }
    }
}

/// Load a seed file (a JSON array of instance records) through a full resync.
pub async fn seed(engine: &Engine, path: &std::path::Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let records: Vec<ResyncRecord> = serde_json::from_str(&content)
        .map_err(scenesync_core::Error::from)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
    let report = engine.replace_all(records).await;
    info!(revision = report.revision, created = report.created, "Seeded tree");
    Ok(())
}

/// Replay every request from `input`, writing one reply line per request.
///
/// Returns the number of requests handled.
pub async fn run(engine: &Engine, input: impl BufRead, mut output: impl Write) -> Result<usize> {
    let mut handled = 0;
    for (number, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read request line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ReplayRequest>(&line) {
            Ok(request) => {
                debug!(line = number + 1, route = ?request.route, "Replaying request");
                let response = handle(
                    engine,
                    request.route,
                    request.idempotency_key.as_deref(),
                    request.body,
                )
                .await;
                ReplayReply {
                    route: Some(request.route),
                    status: response.status,
                    body: response.body,
                }
            }
            Err(err) => {
                let response = bad_request(format!("line {}: {err}", number + 1));
                ReplayReply {
                    route: None,
                    status: response.status,
                    body: response.body,
                }
            }
        };

        serde_json::to_writer(&mut output, &reply).context("Failed to write reply")?;
        writeln!(output).context("Failed to write reply")?;
        handled += 1;
    }
    output.flush().context("Failed to flush output")?;
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenesync_core::Config;

    async fn replay(input: &str) -> Result<Vec<Value>> {
        let engine = Engine::with_config(&Config::default());
        let mut out = Vec::new();
        run(&engine, input.as_bytes(), &mut out).await?;
        String::from_utf8(out)?
            .lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[tokio::test]
    async fn test_replay_routes_in_order() -> Result<()> {
        let input = r#"
{"route":"command","body":{"command":{"op":"create","parentPath":[],"className":"Folder","name":"Workspace"}}}
{"route":"snapshot"}
{"route":"pendingChanges"}
"#;
        let replies = replay(input).await?;

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["status"], 200);
        assert_eq!(replies[1]["body"]["instances"][0]["name"], "Workspace");
        assert_eq!(replies[2]["body"]["changes"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_line_yields_400_and_continues() -> Result<()> {
        let replies = replay("not json\n{\"route\":\"locks\"}\n").await?;

        assert_eq!(replies[0]["status"], 400);
        assert_eq!(replies[1]["status"], 200);
        assert_eq!(replies[1]["route"], "locks");
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_blocks_other_owner() -> Result<()> {
        let input = r#"{"route":"acquire","body":{"owner":"a","paths":[["Workspace"]]}}
{"route":"acquire","body":{"owner":"b","paths":[["Workspace","Part"]]}}
{"route":"release","body":{"owner":"a"}}
"#;
        let replies = replay(input).await?;

        assert_eq!(replies[0]["status"], 200);
        assert_eq!(replies[1]["status"], 423);
        assert_eq!(replies[1]["body"]["conflict"]["owner"], "a");
        assert_eq!(replies[2]["body"]["released"], 1);
        Ok(())
    }
}
