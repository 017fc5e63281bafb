//! 优雅退出管理模块
//!
//! 监听 SIGINT / SIGTERM（Windows 下为 Ctrl+C），通知 HTTP 服务器停止接收新连接，
//! 并在排空超时后强制退出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 优雅退出管理器
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    notify: Notify,
    /// 最近一次退出原因（先触发后等待的场景）
    last_reason: std::sync::Mutex<Option<ShutdownReason>>,
    shutting_down: AtomicBool,
}

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// 应用请求退出
    Application,
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    #[error("优雅退出超时")]
    Timeout,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                notify: Notify::new(),
                last_reason: std::sync::Mutex::new(None),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    fn last_reason(&self) -> ShutdownReason {
        self.inner
            .last_reason
            .lock()
            .ok()
            .and_then(|g| *g)
            .unwrap_or(ShutdownReason::Application)
    }

    /// 等待退出信号，返回退出原因
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        // 先注册再检查，避免触发发生在两者之间时丢失通知
        let notified = self.inner.notify.notified();
        if self.is_shutting_down() {
            return self.last_reason();
        }
        debug!("等待退出信号...");
        notified.await;
        self.last_reason()
    }

    pub async fn wait_for_shutdown_with_timeout(
        &self,
        duration: Duration,
    ) -> Result<ShutdownReason, ShutdownError> {
        timeout(duration, self.wait_for_shutdown())
            .await
            .map_err(|_| ShutdownError::Timeout)
    }

    /// 触发优雅退出；只有第一次生效
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self
            .inner
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !first {
            debug!("重复的退出信号被忽略");
            return;
        }

        info!("触发优雅退出: {:?}", reason);
        if let Ok(mut guard) = self.inner.last_reason.lock() {
            *guard = Some(reason);
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// 启动信号处理器
    pub fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

            let manager = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("接收到SIGINT信号 (Ctrl+C)");
                        manager.trigger_shutdown(ShutdownReason::Interrupt);
                    }
                    _ = sigterm.recv() => {
                        info!("接收到SIGTERM信号");
                        manager.trigger_shutdown(ShutdownReason::Terminate);
                    }
                }
            });
        }

        #[cfg(windows)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("监听Ctrl+C信号失败: {}", e);
                    return;
                }
                info!("接收到Ctrl+C信号");
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            });
        }

        Ok(())
    }

    /// 退出开始后，若 `drain` 时间内进程仍未结束则强制退出
    pub fn spawn_drain_deadline(&self, drain: Duration) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.wait_for_shutdown().await;
            tokio::time::sleep(drain).await;
            warn!("优雅退出超时（{}秒），强制退出", drain.as_secs());
            std::process::exit(1);
        });
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
