//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentline::background::RunTasks;
use agentline::config::Config;
use agentline::context::{
    ContextBuilder, MemoryStore, load_bootstrap, load_skills, render_system_prompt,
};
use agentline::llm::{LLMProvider, OpenAICompatibleProvider};
use agentline::server::{self, AppState};
use agentline::session::{AgentLoop, DEFAULT_CLEANUP_INTERVAL, SessionRegistry};
use agentline::tools::{ToolDispatcher, create_builtins};

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config from '{config_path}'"))?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    // Tools resolve paths against an absolute workspace root
    tokio::fs::create_dir_all(&config.tools.workspace)
        .await
        .with_context(|| {
            format!(
                "failed to create workspace '{}'",
                config.tools.workspace.display()
            )
        })?;
    config.tools.workspace = tokio::fs::canonicalize(&config.tools.workspace).await?;
    let workspace = config.tools.workspace.clone();

    let client = reqwest::Client::builder()
        .user_agent(concat!("agentline/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let api_key = config.llm.resolved_api_key();
    if api_key.is_none() {
        warn!("No LLM API key configured (llm.api_key or OPENAI_API_KEY)");
    }
    let provider: Arc<dyn LLMProvider> = Arc::new(OpenAICompatibleProvider::new(
        client.clone(),
        config.llm.base_url.clone(),
        api_key,
    ));

    let tools = Arc::new(ToolDispatcher::new().register_all(create_builtins(&config.tools, client)?));
    info!(tools = tools.len(), workspace = %workspace.display(), "Registered tools");

    let bootstrap = load_bootstrap(&workspace).await;
    if !bootstrap.is_empty() {
        info!(files = bootstrap.len(), "Loaded bootstrap files");
    }
    let skills = load_skills(&workspace).await;
    if !skills.is_empty() {
        info!(
            skills = skills.len(),
            always = skills.iter().filter(|s| s.always).count(),
            "Loaded skills"
        );
    }
    let context = ContextBuilder::new(
        render_system_prompt(&workspace, &tools, &bootstrap, &skills),
        config.llm.model.clone(),
    )
    .with_history_window(config.session.history_window)
    .with_sampling(config.llm.temperature, config.llm.max_tokens)
    .with_memory(MemoryStore::new(&workspace));

    let agent = AgentLoop::new(provider, tools.clone(), context, &config.agent);
    let sessions = SessionRegistry::new(config.session.on_busy, config.session.acquire_timeout());
    let shutdown = CancellationToken::new();

    let cleanup = config.session.idle_ttl().map(|ttl| {
        info!(ttl_seconds = ttl.as_secs(), "Idle session eviction enabled");
        sessions
            .clone()
            .spawn_cleanup_task(DEFAULT_CLEANUP_INTERVAL.min(ttl), ttl, shutdown.clone())
    });

    let runs = RunTasks::new();
    let state = AppState {
        sessions,
        agent,
        runs: runs.clone(),
        shutdown: shutdown.clone(),
        event_buffer: config.agent.event_buffer,
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        tool_count: tools.len(),
    };

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        addr = %addr,
        model = %config.llm.model,
        on_busy = ?config.session.on_busy,
        "Starting server"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Open SSE streams end once their runs see the cancelled token
    runs.shutdown().await;
    if let Some(cleanup) = cleanup
        && let Err(e) = cleanup.await
    {
        warn!(error = %e, "Session cleanup task panicked");
    }

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling every in-flight run.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }

    shutdown.cancel();
}
