//! Main application orchestration.
//!
//! Wires the message intake (DOM watcher or console listener) into the
//! bridge, the bridge into the pipeline, and runs until Ctrl+C or until the
//! intake gives up.

use crate::config::{AppConfig, IntakeMode};
use crate::error::{AppError, AppResult};
use crate::pipeline::Pipeline;
use sigrelay_bridge::{bridge_channel, BridgeReceiver, BridgeSender, ConsoleListener, DevToolsConfig};
use sigrelay_executor::{build_client, DispatchGatekeeper};
use sigrelay_risk::ChannelFilter;
use sigrelay_signal::{OpenAiClient, SignalGenerator};
use sigrelay_telemetry::{Metrics, SessionStatsReporter};
use std::sync::Arc;
use sigrelay_watch::{CdpDomSession, WatchDriver, Watcher};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Spawned intake task. The console listener is kept for status gauges.
struct Intake {
    task: JoinHandle<AppResult<()>>,
    console: Option<Arc<ConsoleListener>>,
}

impl Intake {
    fn spawn(
        mode: IntakeMode,
        config: DevToolsConfig,
        sender: BridgeSender,
        token: CancellationToken,
    ) -> Self {
        match mode {
            IntakeMode::Dom => {
                let (session, host, batches) = CdpDomSession::new(config, token.clone());
                let driver = WatchDriver::new(Watcher::new(host, sender), batches, token);
                let task = tokio::spawn(async move {
                    let (result, watcher) = tokio::join!(session.run(), driver.run());
                    info!(extracted = watcher.extracted(), "Watcher stopped");
                    result.map_err(AppError::from)
                });
                Self { task, console: None }
            }
            IntakeMode::Console => {
                let listener = Arc::new(ConsoleListener::new(config, sender, token));
                let task = {
                    let listener = listener.clone();
                    tokio::spawn(async move { listener.run().await.map_err(AppError::from) })
                };
                Self {
                    task,
                    console: Some(listener),
                }
            }
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    pipeline: Pipeline,
    gatekeeper: Arc<DispatchGatekeeper>,
}

impl Application {
    /// Build every stage from a validated configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let gatekeeper = Arc::new(DispatchGatekeeper::new(
            config.policy()?,
            config.pipeline.venue_timeout(),
        ));
        for (venue, credentials, base_url) in config.venue_accounts()? {
            gatekeeper.register(build_client(venue, credentials, base_url)?);
        }

        let reasoning = OpenAiClient::new(config.llm.clone())?;
        info!(model = reasoning.model(), "Reasoning client ready");
        let generator = SignalGenerator::new(
            Arc::new(reasoning),
            Duration::from_millis(config.llm.timeout_ms),
        );

        let pipeline = Pipeline::new(
            ChannelFilter::new(config.target_channels.iter().cloned()),
            generator,
            gatekeeper.clone(),
            config.read_only_mode,
            config.pipeline.shutdown_grace(),
        );

        Ok(Self {
            config,
            pipeline,
            gatekeeper,
        })
    }

    fn log_risk_notice(&self) {
        warn!("sigrelay attaches to a third-party desktop client through its debug interface; this may violate the client's terms of service");
        if self.pipeline.is_read_only() {
            info!("Read-only mode: messages are analyzed, no orders are placed");
        } else {
            warn!(
                venues = ?self.gatekeeper.registered_venues(),
                "Trading mode: signals that pass the gates place live orders"
            );
        }
    }

    /// Run until Ctrl+C or until the intake stops for good.
    pub async fn run(self) -> AppResult<()> {
        self.log_risk_notice();
        let session = SessionStatsReporter::new();

        if !self.pipeline.is_read_only() {
            let connected = self.gatekeeper.connect_all().await;
            if connected == 0 {
                warn!("No venue answered at startup; orders will retry the connection");
            }
        }

        let shutdown = CancellationToken::new();
        let (sender, mut receiver) = bridge_channel();
        let mut intake = Intake::spawn(
            self.config.intake,
            self.config.devtools_config(),
            sender,
            shutdown.child_token(),
        );
        info!(
            cdp_url = %self.config.cdp_url,
            intake = ?self.config.intake,
            "Listening for chat messages (Ctrl+C to stop)"
        );

        let mut status = tokio::time::interval(self.config.pipeline.status_interval());
        let mut intake_result = None;

        loop {
            tokio::select! {
                msg = receiver.recv() => match msg {
                    Some(msg) => {
                        self.pipeline.submit(msg);
                    }
                    None => {
                        warn!("Bridge closed");
                        break;
                    }
                },

                result = &mut intake.task => {
                    intake_result = Some(result);
                    break;
                }

                _ = status.tick() => {
                    publish_status(intake.console.as_deref(), &receiver);
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Shutting down");
        shutdown.cancel();
        receiver.close();
        self.pipeline.shutdown().await;

        let intake_result = match intake_result {
            Some(result) => result,
            None => (&mut intake.task).await,
        };
        publish_status(intake.console.as_deref(), &receiver);
        session.output_summary();

        match intake_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Message intake stopped");
                Err(e)
            }
            Err(join_error) => {
                error!(error = %join_error, "Message intake task failed");
                Ok(())
            }
        }
    }
}

fn publish_status(console: Option<&ConsoleListener>, receiver: &BridgeReceiver) {
    if let Some(listener) = console {
        Metrics::console_state_set(listener.state().as_str());
    }
    let stats = receiver.stats();
    Metrics::bridge_lines(stats.accepted(), stats.dropped(), stats.lost());
}
