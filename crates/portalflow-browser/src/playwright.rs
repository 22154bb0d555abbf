//! Playwright-backed pages.
//!
//! Each page is a Node.js child process running a generated runner script.
//! Commands go to its stdin as one JSON object per line; answers come back on
//! stdout prefixed by [`RESULT_MARKER`] and carry the command id.

use crate::{
    Action, BrowserDriver, BrowserError, BrowserPage, CaptureRegion, Interaction, LaunchOptions,
    Result, WaitUntil, ensure_bounded,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

const RESULT_MARKER: &str = "__PORTALFLOW_BROWSER_RESULT__=";
/// Slack granted on top of the engine-side timeout for the round trip.
const RESPONSE_GRACE: Duration = Duration::from_secs(2);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeProbe {
    pub node_available: bool,
    pub node_version: Option<String>,
    pub playwright_package_available: bool,
    pub chromium_cache_detected: bool,
    pub ready: bool,
    pub notes: Vec<String>,
}

impl RuntimeProbe {
    fn empty() -> Self {
        Self {
            node_available: false,
            node_version: None,
            playwright_package_available: false,
            chromium_cache_detected: false,
            ready: false,
            notes: Vec::new(),
        }
    }
}

/// Opens pages by spawning `node` with the page runner script.
#[derive(Debug, Clone)]
pub struct PlaywrightDriver {
    node_binary: String,
    working_dir: Option<PathBuf>,
}

impl Default for PlaywrightDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaywrightDriver {
    pub fn new() -> Self {
        Self {
            node_binary: "node".to_string(),
            working_dir: None,
        }
    }

    pub fn with_node_binary(mut self, binary: impl Into<String>) -> Self {
        self.node_binary = binary.into();
        self
    }

    /// Directory `playwright` is resolved from (its `node_modules`).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub async fn probe_runtime(&self) -> anyhow::Result<RuntimeProbe> {
        let mut probe = RuntimeProbe::empty();

        let node_probe = run_command_capture(
            &self.node_binary,
            &["--version".to_string()],
            self.working_dir.as_deref(),
            10,
        )
        .await;

        if let Ok(output) = node_probe
            && output.exit_code == 0
        {
            probe.node_available = true;
            probe.node_version = Some(output.stdout.trim().to_string());
        }

        if probe.node_available {
            let playwright_probe = run_command_capture(
                &self.node_binary,
                &[
                    "-e".to_string(),
                    "try { require.resolve('playwright'); process.exit(0); } catch (e) { process.exit(1); }"
                        .to_string(),
                ],
                self.working_dir.as_deref(),
                15,
            )
            .await;
            probe.playwright_package_available = playwright_probe
                .map(|output| output.exit_code == 0)
                .unwrap_or(false);
        }

        probe.chromium_cache_detected = detect_chromium_cache();
        probe.ready = probe.node_available && probe.playwright_package_available;

        if !probe.node_available {
            probe.notes.push(
                "Node.js not found. Install Node.js 20+ to enable portal automation.".to_string(),
            );
        }

        if probe.node_available && !probe.playwright_package_available {
            probe
                .notes
                .push("Playwright npm package not found. Run: npm i playwright".to_string());
        }

        if probe.ready && !probe.chromium_cache_detected {
            probe.notes.push(
                "Chromium browser binary not found in Playwright cache. Run: npx playwright install chromium".to_string(),
            );
        }

        Ok(probe)
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn open(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
        let workdir = tempfile::Builder::new()
            .prefix("portalflow-page-")
            .tempdir()?;
        let script_path = workdir.path().join("page-runner.cjs");
        std::fs::write(&script_path, build_page_runner(options)?)?;

        let mut command = Command::new(&self.node_binary);
        command
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|err| BrowserError::Launch(format!("failed to start node: {}", err)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BrowserError::Launch("node stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BrowserError::Launch("node stdout unavailable".to_string()))?;

        let mut page = PlaywrightPage {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
            _workdir: workdir,
        };

        // The runner reports id 0 once chromium is up.
        match page.read_response(0, options.launch_timeout()).await {
            Ok(_) => {
                debug!(headless = options.headless, "Playwright page ready");
                Ok(Box::new(page))
            }
            Err(err) => {
                let _ = page.child.kill().await;
                page.closed = true;
                Err(BrowserError::Launch(err.to_string()))
            }
        }
    }
}

pub struct PlaywrightPage {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
    _workdir: tempfile::TempDir,
}

impl PlaywrightPage {
    async fn request(&mut self, mut command: Value, budget: Duration) -> Result<Value> {
        if self.closed {
            return Err(BrowserError::Closed);
        }

        let id = self.next_id;
        self.next_id += 1;
        command["id"] = json!(id);

        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        self.read_response(id, budget + RESPONSE_GRACE).await
    }

    async fn read_response(&mut self, id: u64, budget: Duration) -> Result<Value> {
        let stdout = &mut self.stdout;
        let read = async {
            loop {
                let Some(line) = stdout.next_line().await? else {
                    return Err(BrowserError::Closed);
                };
                match parse_result_line(&line) {
                    Some(payload) if payload.get("id").and_then(Value::as_u64) == Some(id) => {
                        return Ok(payload);
                    }
                    Some(payload) => {
                        warn!(expected = id, got = ?payload.get("id"), "Discarding stale runner reply");
                    }
                    None => debug!(target: "portalflow_browser::runner", "{}", line),
                }
            }
        };

        let payload = match timeout(budget, read).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BrowserError::Timeout {
                    operation: format!("runner reply #{}", id),
                    timeout_ms: budget.as_millis() as u64,
                });
            }
        };

        into_result(payload)
    }
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<()> {
        ensure_bounded(timeout, "navigate")?;
        self.request(
            json!({
                "op": "navigate",
                "url": url,
                "waitUntil": wait_until.as_playwright(),
                "timeoutMs": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn interact(&mut self, interaction: Interaction) -> Result<Value> {
        ensure_bounded(interaction.timeout(), &interaction.action.describe())?;
        let budget = match &interaction.action {
            Action::Pause { ms } => interaction.timeout().max(Duration::from_millis(*ms)),
            _ => interaction.timeout(),
        };
        self.request(
            json!({ "op": "interact", "action": interaction }),
            budget,
        )
        .await
    }

    async fn screenshot(&mut self, region: CaptureRegion, timeout: Duration) -> Result<Vec<u8>> {
        ensure_bounded(timeout, "screenshot")?;
        let value = self
            .request(
                json!({
                    "op": "screenshot",
                    "region": region,
                    "timeoutMs": timeout.as_millis() as u64,
                }),
                timeout,
            )
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("screenshot reply is not a string".into()))?;
        BASE64
            .decode(encoded)
            .map_err(|err| BrowserError::Protocol(format!("invalid screenshot payload: {}", err)))
    }

    async fn evaluate(&mut self, script: &str, arg: Value, timeout: Duration) -> Result<Value> {
        ensure_bounded(timeout, "evaluate")?;
        self.request(
            json!({
                "op": "evaluate",
                "script": script,
                "arg": arg,
                "timeoutMs": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        if let Err(err) = self.request(json!({ "op": "close" }), CLOSE_TIMEOUT).await {
            debug!(error = %err, "Runner did not acknowledge close");
        }
        self.closed = true;

        if let Err(err) = self.child.kill().await {
            // Already exited after the close acknowledgement.
            debug!(error = %err, "Runner process kill skipped");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn parse_result_line(line: &str) -> Option<Value> {
    let rest = line.strip_prefix(RESULT_MARKER)?;
    serde_json::from_str::<Value>(rest.trim()).ok()
}

fn into_result(payload: Value) -> Result<Value> {
    if payload.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
    }

    let message = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Browser command failed")
        .to_string();

    if payload.get("timeout").and_then(Value::as_bool) == Some(true) {
        return Err(BrowserError::Timeout {
            operation: message,
            timeout_ms: payload
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        });
    }

    Err(BrowserError::Interaction(message))
}

fn build_page_runner(options: &LaunchOptions) -> Result<String> {
    let launch_literal = json!({
        "headless": options.headless,
        "slowMo": options.slow_mo_ms,
    })
    .to_string();

    let mut script = String::new();
    script.push_str("'use strict';\n");
    script.push_str("const path = require('node:path');\n");
    script.push_str("const readline = require('node:readline');\n");
    script.push_str("const { createRequire } = require('node:module');\n\n");
    script.push_str(&format!("const RESULT_MARKER = '{}';\n", RESULT_MARKER));
    script.push_str(&format!("const launchOptions = {};\n\n", launch_literal));

    script.push_str("function reply(id, body) {\n");
    script.push_str("  process.stdout.write(`${RESULT_MARKER}${JSON.stringify({ id, ...body })}\\n`);\n");
    script.push_str("}\n\n");

    script.push_str("function failure(id, error, timeoutMs) {\n");
    script.push_str("  const message = error && error.message ? error.message : String(error);\n");
    script.push_str("  const timeout = !!(error && error.name === 'TimeoutError');\n");
    script.push_str("  reply(id, { success: false, error: message, timeout, timeoutMs });\n");
    script.push_str("}\n\n");

    script.push_str("async function interact(page, action) {\n");
    script.push_str("  const timeout = action.timeout_ms;\n");
    script.push_str("  switch (action.type) {\n");
    script.push_str("    case 'click': await page.click(action.selector, { timeout }); return null;\n");
    script.push_str("    case 'fill': await page.fill(action.selector, action.text, { timeout }); return null;\n");
    script.push_str("    case 'type': await page.type(action.selector, action.text, { delay: action.delay_ms || 0, timeout }); return null;\n");
    script.push_str("    case 'select_option': await page.selectOption(action.selector, action.value, { timeout }); return null;\n");
    script.push_str("    case 'check': await page.check(action.selector, { timeout }); return null;\n");
    script.push_str("    case 'check_all': {\n");
    script.push_str("      const boxes = await page.$$(action.selector);\n");
    script.push_str("      for (const box of boxes) { await box.check({ timeout }); }\n");
    script.push_str("      return boxes.length;\n");
    script.push_str("    }\n");
    script.push_str("    case 'hover': await page.hover(action.selector, { timeout }); return null;\n");
    script.push_str("    case 'wait_for_selector': await page.waitForSelector(action.selector, { state: action.state || 'visible', timeout }); return true;\n");
    script.push_str("    case 'text_content': return await page.textContent(action.selector, { timeout });\n");
    script.push_str("    case 'exists': return (await page.$(action.selector)) !== null;\n");
    script.push_str("    case 'title': return await page.title();\n");
    script.push_str("    case 'pause': await page.waitForTimeout(action.ms); return null;\n");
    script.push_str("    default: throw new Error(`Unsupported action type: ${action.type}`);\n");
    script.push_str("  }\n");
    script.push_str("}\n\n");

    script.push_str("async function capture(page, region, timeout) {\n");
    script.push_str("  let buffer;\n");
    script.push_str("  if (region.kind === 'element') {\n");
    script.push_str("    const handle = await page.waitForSelector(region.selector, { state: 'visible', timeout });\n");
    script.push_str("    buffer = await handle.screenshot({ timeout });\n");
    script.push_str("  } else {\n");
    script.push_str("    buffer = await page.screenshot({ fullPage: region.kind === 'full_page', timeout });\n");
    script.push_str("  }\n");
    script.push_str("  return buffer.toString('base64');\n");
    script.push_str("}\n\n");

    script.push_str("(async () => {\n");
    script.push_str("  let chromium;\n");
    script.push_str("  try {\n");
    script.push_str("    const localRequire = createRequire(path.join(process.cwd(), 'package.json'));\n");
    script.push_str("    ({ chromium } = localRequire('playwright'));\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    failure(0, error);\n");
    script.push_str("    process.exit(1);\n");
    script.push_str("  }\n\n");

    script.push_str("  let browser;\n");
    script.push_str("  let page;\n");
    script.push_str("  try {\n");
    script.push_str("    browser = await chromium.launch(launchOptions);\n");
    script.push_str("    const context = await browser.newContext();\n");
    script.push_str("    page = await context.newPage();\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    failure(0, error);\n");
    script.push_str("    process.exit(1);\n");
    script.push_str("  }\n");
    script.push_str("  reply(0, { success: true, result: null });\n\n");

    script.push_str("  const shutdown = async () => {\n");
    script.push_str("    await browser.close().catch(() => {});\n");
    script.push_str("  };\n");
    script.push_str("  process.on('SIGTERM', () => shutdown().then(() => process.exit(0)));\n\n");

    script.push_str("  const lines = readline.createInterface({ input: process.stdin });\n");
    script.push_str("  for await (const line of lines) {\n");
    script.push_str("    if (!line.trim()) continue;\n");
    script.push_str("    let command;\n");
    script.push_str("    try {\n");
    script.push_str("      command = JSON.parse(line);\n");
    script.push_str("    } catch (error) {\n");
    script.push_str("      continue;\n");
    script.push_str("    }\n");
    script.push_str("    const id = command.id;\n");
    script.push_str("    try {\n");
    script.push_str("      switch (command.op) {\n");
    script.push_str("        case 'navigate':\n");
    script.push_str("          await page.goto(command.url, { waitUntil: command.waitUntil, timeout: command.timeoutMs });\n");
    script.push_str("          reply(id, { success: true, result: null });\n");
    script.push_str("          break;\n");
    script.push_str("        case 'interact':\n");
    script.push_str("          reply(id, { success: true, result: await interact(page, command.action) });\n");
    script.push_str("          break;\n");
    script.push_str("        case 'screenshot':\n");
    script.push_str("          reply(id, { success: true, result: await capture(page, command.region, command.timeoutMs) });\n");
    script.push_str("          break;\n");
    script.push_str("        case 'evaluate': {\n");
    script.push_str("          const evaluation = page.evaluate(command.script, command.arg);\n");
    script.push_str("          const limit = new Promise((_, reject) => setTimeout(() => {\n");
    script.push_str("            const error = new Error(`evaluate exceeded ${command.timeoutMs}ms`);\n");
    script.push_str("            error.name = 'TimeoutError';\n");
    script.push_str("            reject(error);\n");
    script.push_str("          }, command.timeoutMs));\n");
    script.push_str("          reply(id, { success: true, result: (await Promise.race([evaluation, limit])) ?? null });\n");
    script.push_str("          break;\n");
    script.push_str("        }\n");
    script.push_str("        case 'close':\n");
    script.push_str("          await shutdown();\n");
    script.push_str("          reply(id, { success: true, result: null });\n");
    script.push_str("          process.exit(0);\n");
    script.push_str("        default:\n");
    script.push_str("          throw new Error(`Unsupported op: ${command.op}`);\n");
    script.push_str("      }\n");
    script.push_str("    } catch (error) {\n");
    script.push_str("      failure(id, error, command.timeoutMs || (command.action && command.action.timeout_ms));\n");
    script.push_str("    }\n");
    script.push_str("  }\n");
    script.push_str("  await shutdown();\n");
    script.push_str("})();\n");

    Ok(script)
}

struct CommandCapture {
    exit_code: i32,
    stdout: String,
}

async fn run_command_capture(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> anyhow::Result<CommandCapture> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = match timeout(Duration::from_secs(timeout_secs), command.output()).await {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("Command timed out after {} seconds", timeout_secs),
    };

    Ok(CommandCapture {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    })
}

fn detect_chromium_cache() -> bool {
    if let Ok(path) = std::env::var("PLAYWRIGHT_BROWSERS_PATH") {
        let parsed = PathBuf::from(path);
        if parsed.exists() {
            return true;
        }
    }

    let mut candidates = Vec::new();

    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(&home).join(".cache/ms-playwright"));
        candidates.push(PathBuf::from(&home).join("Library/Caches/ms-playwright"));
    }

    if let Ok(user_profile) = std::env::var("USERPROFILE") {
        candidates.push(PathBuf::from(user_profile).join("AppData/Local/ms-playwright"));
    }

    candidates.into_iter().any(|path| path.exists())
}
