// Command handlers - Wire settings into the pipeline for each subcommand
use crate::application::backend::MonitorBackend;
use crate::application::chart_renderer::ChartSurface;
use crate::application::command_dispatcher::CommandDispatcher;
use crate::application::session::MonitorSession;
use crate::domain::device::ActuatorCommand;
use crate::infrastructure::config::{Settings, SurfaceKind};
use crate::infrastructure::http_backend::HttpBackend;
use crate::infrastructure::log_surface::LogSurface;
use crate::infrastructure::socketio_transport::SocketIoTransport;
use crate::infrastructure::terminal_surface::{self, TerminalSurface};
use anyhow::Context;
use std::sync::Arc;

fn backend(settings: &Settings) -> anyhow::Result<Arc<HttpBackend>> {
    let backend = HttpBackend::new(&settings.backend.base_url, settings.backend.request_timeout())
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(backend))
}

/// Run a monitoring session until Ctrl-C.
pub async fn monitor(settings: &Settings) -> anyhow::Result<()> {
    let backend = backend(settings)?;
    let url = settings.channel.resolve_url(&settings.backend);
    let transport = Arc::new(SocketIoTransport::new(url.clone()));

    let surface: Box<dyn ChartSurface> = match settings.monitor.surface {
        SurfaceKind::Terminal => Box::new(TerminalSurface::stdout().context("Failed to open terminal")?),
        SurfaceKind::Log => Box::new(LogSurface::new()),
    };

    tracing::info!("Listening on {} (backend {})", url, settings.backend.base_url);
    let session = MonitorSession::start(
        &settings.monitor,
        settings.channel.reconnect_policy(),
        backend,
        transport,
        surface,
    );

    let interrupted = tokio::signal::ctrl_c().await;
    let last_state = session.connection_state();
    let store = session.shutdown().await;

    if settings.monitor.surface == SurfaceKind::Terminal {
        terminal_surface::leave_screen().context("Failed to restore terminal")?;
    }
    interrupted.context("Failed to listen for Ctrl-C")?;

    tracing::info!(
        "Stopped ({}), {} vials buffered",
        last_state,
        store.vials().len()
    );
    Ok(())
}

/// Send one actuator command and print the backend's answer.
pub async fn dispatch(settings: &Settings, command: ActuatorCommand) -> anyhow::Result<()> {
    let dispatcher = CommandDispatcher::new(backend(settings)?);

    match dispatcher.dispatch(command).await {
        Ok(ack) => {
            println!("{}", ack.message);
            Ok(())
        }
        Err(error) => anyhow::bail!("{}", error),
    }
}

pub async fn status(settings: &Settings) -> anyhow::Result<()> {
    let backend = backend(settings)?;

    let service = backend
        .service_status()
        .await
        .context("Failed to fetch service status")?;
    println!(
        "service: {} (mode {})",
        service.status,
        service.mode.as_deref().unwrap_or("unknown")
    );

    match backend
        .active_experiment()
        .await
        .context("Failed to fetch active experiment")?
    {
        Some(experiment) => println!("experiment: {}", experiment.display_name()),
        None => println!("experiment: none running"),
    }
    Ok(())
}
