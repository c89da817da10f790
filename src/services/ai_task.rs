use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AiTaskError {
    #[error("已有 AI 请求进行中，请等待完成")]
    Busy,
}

/// 一次 AI 调用的结果：成功载荷或失败原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum AiOutcome<T> {
    Succeeded(T),
    Failed(String),
}

impl<T> AiOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AiOutcome::Succeeded(_))
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            AiOutcome::Succeeded(v) => Ok(v),
            AiOutcome::Failed(reason) => Err(reason),
        }
    }
}

/// 单槽位：同一时间只允许一个 AI 请求在途，不支持取消
#[derive(Debug, Default)]
pub struct AiTaskSlot {
    busy: AtomicBool,
}

/// 持有期间槽位为忙，drop 后恢复空闲（成功失败都一样）
pub struct SlotGuard<'a> {
    slot: &'a AiTaskSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

impl AiTaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Result<SlotGuard<'_>, AiTaskError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SlotGuard { slot: self })
            .map_err(|_| AiTaskError::Busy)
    }

    /// 占住槽位执行 `task`，把错误折叠成 `AiOutcome::Failed`
    pub async fn run<T, F>(&self, task: F) -> Result<AiOutcome<T>, AiTaskError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let _guard = self.try_acquire()?;
        let outcome = match task.await {
            Ok(v) => AiOutcome::Succeeded(v),
            Err(e) => {
                log::error!("AI 请求失败: {:#}", e);
                AiOutcome::Failed(format!("{:#}", e))
            }
        };
        Ok(outcome)
    }
}
