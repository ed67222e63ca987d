use crate::auditlog::LogLine;
use crate::config::{NotifierConfig, NotifierKind};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    future::Future,
    path::Path,
    pin::Pin,
    sync::Arc,
    time::Instant,
};
use tokio::{fs::File, io::AsyncWriteExt, select};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub type NotificationSender = tokio::sync::mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = tokio::sync::mpsc::UnboundedReceiver<Notification>;

pub type FnDeliverNotification = Arc<
    Box<
        dyn Fn(Arc<NotifierConfig>, Notification) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
            + Send
            + Sync,
    >,
>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Summary line, a blank line, then one timestamped line per audit entry.
pub fn format_body(summary: &str, lines: &[LogLine]) -> String {
    let mut body = format!("{}\n\n", summary);
    for line in lines {
        body.push_str(&format!(
            "{} {}\n",
            line.logged_at.format("%Y-%m-%d %H:%M:%S"),
            line.message
        ));
    }
    body
}

pub struct NotificationManager {
    pub sender: NotificationSender,
    config: Arc<NotifierConfig>,
    cancel_token: CancellationToken,
    receiver: NotificationReceiver,
    deliver_fn: FnDeliverNotification,
}

pub struct NotificationManagerBuilder {
    pub cancel_token: Option<CancellationToken>,
    pub config: Option<NotifierConfig>,
    deliver_fn: Option<FnDeliverNotification>,
}

impl NotificationManagerBuilder {
    pub fn new() -> Self {
        Self {
            cancel_token: None,
            config: None,
            deliver_fn: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_deliver(mut self, deliver: FnDeliverNotification) -> Self {
        self.deliver_fn = Some(deliver);
        self
    }

    pub fn build(self) -> NotificationManager {
        let cancel_token = self.cancel_token.unwrap_or_default();
        let config = Arc::new(self.config.unwrap_or_default());
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let deliver_fn = self
            .deliver_fn
            .unwrap_or_else(|| Arc::new(Box::new(NotificationManager::default_deliver)));

        if let NotifierKind::Local { root } = &config.kind {
            if !Path::new(root).exists() {
                match std::fs::create_dir_all(root) {
                    Ok(_) => info!("NotificationManager created directory: {}", root),
                    Err(e) => error!("NotificationManager failed to create directory: {}", e),
                }
            }
        }

        NotificationManager {
            sender,
            config,
            cancel_token,
            receiver,
            deliver_fn,
        }
    }
}

impl Default for NotificationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    fn default_deliver(
        config: Arc<NotifierConfig>,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            let start_time = Instant::now();
            let subject = format!("{} {}", config.subject_prefix, notification.subject);
            let r = match &config.kind {
                NotifierKind::Log => {
                    info!(subject, body = notification.body, "call notification");
                    Ok("logged".to_string())
                }
                NotifierKind::Http { url, headers } => {
                    Self::deliver_with_http(url, headers, &subject, &notification).await
                }
                NotifierKind::Local { root } => {
                    Self::deliver_to_local(root, &subject, &notification).await
                }
            };
            let destination = match r {
                Ok(destination) => destination,
                Err(e) => {
                    error!("Failed to deliver notification: {}", e);
                    return Err(e);
                }
            };
            let elapsed = start_time.elapsed();
            info!(?elapsed, subject, destination, "NotificationManager delivered");
            Ok(())
        })
    }

    async fn deliver_with_http(
        url: &str,
        headers: &Option<HashMap<String, String>>,
        subject: &str,
        notification: &Notification,
    ) -> Result<String> {
        let client = reqwest::Client::new();
        let mut request = client.post(url).json(&Notification {
            subject: subject.to_string(),
            body: notification.body.clone(),
        });

        if let Some(headers_map) = headers {
            for (key, value) in headers_map {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(format!("HTTP {}", url))
        } else {
            Err(anyhow::anyhow!(
                "HTTP notification failed with status: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ))
        }
    }

    async fn deliver_to_local(
        root: &str,
        subject: &str,
        notification: &Notification,
    ) -> Result<String> {
        let file_name = Path::new(root).join(format!(
            "{}.txt",
            Utc::now().format("%Y%m%dT%H%M%S%.6f")
        ));
        let mut file = File::create(&file_name).await?;
        file.write_all(format!("Subject: {}\n\n{}", subject, notification.body).as_bytes())
            .await?;
        file.flush().await?;
        Ok(file_name.to_string_lossy().to_string())
    }

    pub async fn serve(&mut self) {
        let token = self.cancel_token.clone();

        select! {
            _ = self.cancel_token.cancelled() => {
                info!("NotificationManager cancelled");
            }
            _ = Self::recv_loop(
                token,
                self.config.clone(),
                self.deliver_fn.clone(),
                &mut self.receiver,
            ) => {
                info!("NotificationManager received done");
            }
        }
    }

    async fn recv_loop(
        cancel_token: CancellationToken,
        config: Arc<NotifierConfig>,
        deliver_fn: FnDeliverNotification,
        receiver: &mut NotificationReceiver,
    ) -> Result<()> {
        while let Some(notification) = receiver.recv().await {
            let cancel_token_ref = cancel_token.clone();
            let deliver_fn_ref = deliver_fn.clone();
            let config_ref = config.clone();
            tokio::spawn(async move {
                select! {
                    _ = cancel_token_ref.cancelled() => {
                        info!("NotificationManager cancelled");
                    }
                    r = deliver_fn_ref(config_ref, notification) => {
                        if let Err(e) = r {
                            error!("Failed to deliver notification: {}", e);
                        }
                    }
                }
            });
        }
        Ok(())
    }
}
