use crate::bridge;
use crate::cdp::CdpClient;
use crate::error::HostBackendError;
use crate::signal::SignalDispatcher;
use pagewatch_engine::config::MonitorConfig;
use pagewatch_engine::host::{ParentChannel, SystemClock};
use pagewatch_engine::scheduler::TokioScheduler;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Runs a monitor against pages loaded in a Chromium instance.
pub struct HeadlessHost {
    client: Option<CdpClient>,
    dispatch_task: Option<JoinHandle<()>>,
    visible: bool,
}

impl HeadlessHost {
    pub fn new(visible: bool) -> Self {
        Self {
            client: None,
            dispatch_task: None,
            visible,
        }
    }

    /// Launches the browser and starts feeding page events to a monitor that
    /// publishes through `channel`.
    pub async fn launch(
        &mut self,
        config: MonitorConfig,
        channel: Option<Arc<dyn ParentChannel>>,
    ) -> Result<(), HostBackendError> {
        info!("Launching headless host (Chromium)...");
        let client = CdpClient::launch(self.visible).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        bridge::install(&client.page, tx).await?;

        let dispatch_task = tokio::spawn(async move {
            let mut dispatcher = SignalDispatcher::new(
                config,
                channel,
                Arc::new(SystemClock),
                Arc::new(TokioScheduler::current()),
            );
            while let Some(signal) = rx.recv().await {
                dispatcher.handle(signal);
            }
            info!("Page signal stream ended");
        });

        self.client = Some(client);
        self.dispatch_task = Some(dispatch_task);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    pub async fn navigate(&self, url: &str) -> Result<String, HostBackendError> {
        let client = self.client.as_ref().ok_or(HostBackendError::NotReady)?;
        info!("Navigating to: {}", url);
        client
            .page
            .goto(url)
            .await
            .map_err(|e| HostBackendError::Navigation(e.to_string()))?;
        let landed = client
            .page
            .url()
            .await?
            .unwrap_or_else(|| url.to_string());
        Ok(landed)
    }

    pub async fn close(&mut self) -> Result<(), HostBackendError> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        // Dropping the dispatcher drops the monitor, which cancels its timers.
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
        Ok(())
    }
}
