//! 请求记录存储 - 业务能力层
//!
//! 内存版文档存储，保存生成请求记录供状态轮询使用。
//! 记录自创建起保留 7 天，由后台清理任务按固定间隔删除过期记录。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::RecordError;
use crate::models::generation_request::GenerationRequestRecord;

/// 请求记录存储
#[derive(Clone, Default)]
pub struct RequestStore {
    records: Arc<RwLock<HashMap<String, GenerationRequestRecord>>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入新记录，请求ID必须唯一
    pub async fn insert(&self, record: GenerationRequestRecord) -> Result<(), RecordError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.request_id) {
            return Err(RecordError::Duplicate {
                request_id: record.request_id,
            });
        }
        debug!("保存请求记录: {}", record.request_id);
        records.insert(record.request_id.clone(), record);
        Ok(())
    }

    pub async fn get(&self, request_id: &str) -> Option<GenerationRequestRecord> {
        self.records.read().await.get(request_id).cloned()
    }

    /// 在写锁内修改一条记录
    ///
    /// 状态迁移方法失败时不会改动记录，所以这里不需要回滚。
    pub async fn update<R>(
        &self,
        request_id: &str,
        f: impl FnOnce(&mut GenerationRequestRecord) -> Result<R, RecordError>,
    ) -> Result<R, RecordError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(request_id)
            .ok_or_else(|| RecordError::NotFound {
                request_id: request_id.to_string(),
            })?;
        f(record)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// 删除已过保留期的记录，返回删除数量
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        before - records.len()
    }

    /// 启动后台过期清理任务
    pub fn spawn_expiry_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired(Utc::now()).await;
                if removed > 0 {
                    info!("🧹 清理过期请求记录 {} 条", removed);
                }
            }
        })
    }
}
