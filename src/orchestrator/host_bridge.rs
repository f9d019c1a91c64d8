//! 宿主请求 - 编排层
//!
//! 外部进程可以查询当前标签页、页面状态，或手动切换遮罩层

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::PhaseKind;
use crate::services::{PageHost, PageInspector};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostRequest {
    GetTabInfo,
    GetPageInfo,
    ToggleOverlay { show: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HostResponse {
    TabInfo {
        url: String,
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    PageInfo {
        title: String,
        url: String,
        timestamp: String,
        has_first_step: bool,
    },
    Ack {
        success: bool,
    },
}

pub struct HostBridge {
    inspector: Arc<dyn PageInspector>,
    host: Arc<dyn PageHost>,
}

impl HostBridge {
    pub fn new(inspector: Arc<dyn PageInspector>, host: Arc<dyn PageHost>) -> Self {
        Self { inspector, host }
    }

    pub async fn handle(&self, request: HostRequest) -> Result<HostResponse> {
        info!("收到宿主请求: {:?}", request);
        match request {
            HostRequest::GetTabInfo => Ok(HostResponse::TabInfo {
                url: self.inspector.current_url().await?,
                title: self.inspector.title().await?,
            }),
            HostRequest::GetPageInfo => Ok(HostResponse::PageInfo {
                title: self.inspector.title().await?,
                url: self.inspector.current_url().await?,
                timestamp: chrono::Utc::now().to_rfc3339(),
                has_first_step: self.inspector.is_target_step1_page().await?,
            }),
            HostRequest::ToggleOverlay { show } => {
                if show {
                    self.host.show_overlay(PhaseKind::ArtifactIntake).await?;
                } else {
                    self.host.hide_overlay().await?;
                }
                Ok(HostResponse::Ack { success: true })
            }
        }
    }
}
