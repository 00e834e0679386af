//! Script execution seam and the wasm sandbox behind it

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use keeper_common::types::ResourceStats;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wasmtime::*;

const PAGE_SIZE: u64 = 65536;
const MAX_STREAM_BYTES: usize = 1024 * 1024;

/// What to run and on whose behalf
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub script_url: String,
    pub language: String,
    pub attester_count: u32,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub output: String,
    pub stderr: String,
    pub stats: ResourceStats,
    pub error: Option<String>,
}

impl ScriptOutcome {
    fn failed(error: impl Into<String>, stats: ResourceStats) -> Self {
        Self {
            success: false,
            stats,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Runs untrusted scripts. The executor calls this once per task and never retries.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome>;
}

/// Prices execution in TG, then converts with `price_per_tg`
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub price_per_tg: f64,
    pub fixed_cost: f64,
    pub transaction_simulation: f64,
    pub overhead_cost: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            price_per_tg: 0.0001,
            fixed_cost: 1.0,
            transaction_simulation: 1.0,
            overhead_cost: 0.1,
        }
    }
}

impl FeeSchedule {
    pub fn total_cost(&self, stats: &ResourceStats, elapsed: Duration, attesters: u32) -> f64 {
        let memory_mb = stats.memory_usage as f64 / (1024.0 * 1024.0);
        let computation =
            elapsed.as_secs_f64() * 2.0 + memory_mb / 128.0 + stats.static_complexity / 1024.0;
        let scaling = f64::from(1 + attesters);

        let total_tg = computation * scaling
            + self.fixed_cost
            + self.transaction_simulation
            + self.overhead_cost;
        total_tg * self.price_per_tg
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    fuel: u64,
    memory: u64,
}

#[derive(Default)]
struct HostState {
    memory: Option<Memory>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Wasm script sandbox.
///
/// A script module imports `env.memory`, `env.write_stdout(ptr, len)` and
/// `env.write_stderr(ptr, len)`, and exports `main(ptr, len) -> i32` which
/// receives the request metadata as JSON. Exit code 0 means success.
pub struct WasmScriptRunner {
    engine: Engine,
    http: reqwest::Client,
    limits: Limits,
    fees: FeeSchedule,
}

impl WasmScriptRunner {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();

        config.wasm_threads(false);
        config.cranelift_nan_canonicalization(true);
        config.consume_fuel(true);
        config.max_wasm_stack(1024 * 1024);

        let engine = Engine::new(&config)?;
        Ok(Self {
            engine,
            http: reqwest::Client::new(),
            limits: Limits {
                fuel: 10_000_000,
                memory: 16 * 1024 * 1024,
            },
            fees: FeeSchedule::default(),
        })
    }

    pub fn with_limits(mut self, fuel: u64, memory: u64) -> Result<Self> {
        if fuel == 0 || fuel > u64::MAX / 2 {
            bail!("Invalid fuel limit: {}", fuel);
        }
        if memory < PAGE_SIZE || memory > 256 * 1024 * 1024 {
            bail!("Invalid memory limit: {} bytes", memory);
        }
        self.limits = Limits { fuel, memory };
        Ok(self)
    }

    /// Load a module from an http(s) URL or a local path
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .with_context(|| format!("failed to download script from {}", url))?
                .error_for_status()?;
            return Ok(response.bytes().await?.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read script {}", path))
    }

    /// Run an already loaded module
    pub fn run_module(&self, wasm: &[u8], input: &[u8], attesters: u32) -> Result<ScriptOutcome> {
        execute(&self.engine, self.limits, self.fees, wasm, input, attesters)
    }
}

#[async_trait]
impl ScriptRunner for WasmScriptRunner {
    async fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome> {
        let language = request.language.to_lowercase();
        if !matches!(language.as_str(), "" | "wasm" | "wat") {
            return Ok(ScriptOutcome::failed(
                format!("unsupported script language: {}", request.language),
                ResourceStats::default(),
            ));
        }

        let wasm = self.fetch(&request.script_url).await?;
        let input = serde_json::to_vec(&request.metadata)?;
        debug!(url = %request.script_url, bytes = wasm.len(), "Loaded script");

        let engine = self.engine.clone();
        let (limits, fees, attesters) = (self.limits, self.fees, request.attester_count);
        let outcome = tokio::task::spawn_blocking(move || {
            execute(&engine, limits, fees, &wasm, &input, attesters)
        })
        .await??;

        info!(
            url = %request.script_url,
            success = outcome.success,
            total_cost = outcome.stats.total_cost,
            "Script finished"
        );
        Ok(outcome)
    }
}

fn read_guest(caller: &Caller<'_, HostState>, ptr: i32, len: i32) -> Result<Vec<u8>> {
    let memory = caller
        .data()
        .memory
        .ok_or_else(|| anyhow!("guest memory is not initialized"))?;
    let mut buf = vec![0u8; len.max(0) as usize];
    memory.read(caller, ptr as u32 as usize, &mut buf)?;
    Ok(buf)
}

fn append_bounded(stream: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_STREAM_BYTES.saturating_sub(stream.len());
    stream.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

fn execute(
    engine: &Engine,
    limits: Limits,
    fees: FeeSchedule,
    wasm: &[u8],
    input: &[u8],
    attesters: u32,
) -> Result<ScriptOutcome> {
    let started = Instant::now();
    let module = Module::new(engine, wasm).context("failed to compile script")?;

    let mut store = Store::new(engine, HostState::default());
    store.set_fuel(limits.fuel)?;

    let max_pages = (limits.memory / PAGE_SIZE) as u32;
    let memory = Memory::new(&mut store, MemoryType::new(1, Some(max_pages)))?;
    store.data_mut().memory = Some(memory);

    let mut linker = Linker::new(engine);
    linker.define(&mut store, "env", "memory", memory)?;
    linker.func_wrap(
        "env",
        "write_stdout",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<()> {
            let bytes = read_guest(&caller, ptr, len)?;
            append_bounded(&mut caller.data_mut().stdout, &bytes);
            Ok(())
        },
    )?;
    linker.func_wrap(
        "env",
        "write_stderr",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<()> {
            let bytes = read_guest(&caller, ptr, len)?;
            append_bounded(&mut caller.data_mut().stderr, &bytes);
            Ok(())
        },
    )?;

    let instance = linker
        .instantiate(&mut store, &module)
        .context("failed to instantiate script")?;
    let main = instance.get_typed_func::<(i32, i32), i32>(&mut store, "main")?;

    if input.len() > memory.data_size(&store) {
        bail!("script input of {} bytes does not fit in guest memory", input.len());
    }
    memory.write(&mut store, 0, input)?;

    let result = main.call(&mut store, (0, input.len() as i32));

    let fuel_used = limits.fuel - store.get_fuel().unwrap_or(0);
    let mut stats = ResourceStats {
        memory_usage: memory.data_size(&store) as u64,
        static_complexity: wasm.len() as f64 / 1024.0,
        dynamic_complexity: fuel_used as f64,
        ..Default::default()
    };
    stats.total_cost = fees.total_cost(&stats, started.elapsed(), attesters);

    let state = store.data();
    let stdout = String::from_utf8_lossy(&state.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&state.stderr).into_owned();

    let error = match result {
        Ok(0) => None,
        Ok(code) => Some(format!("script exited with code {}", code)),
        Err(trap) => {
            warn!(error = %trap, fuel_used, "Script trapped");
            Some(trap.to_string())
        }
    };

    Ok(ScriptOutcome {
        success: error.is_none(),
        output: stdout,
        stderr,
        stats,
        error,
    })
}
