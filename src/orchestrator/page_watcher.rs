//! 页面观察者 - 编排层
//!
//! 定时检查页面，把"页面变成了什么"转成 `PageEvent` 交给会话控制器。
//! 步骤条变化、地址变化、成功页异步渲染都靠轮询发现。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::{PageClass, PageEvent};
use crate::services::PageInspector;

/// 页面分类：成功页优先，其次是已加载完成的填报页第一步
pub async fn classify(inspector: &dyn PageInspector) -> Result<PageClass> {
    if inspector.is_success_page().await? {
        return Ok(PageClass::SuccessPage);
    }

    if !inspector.is_target_page().await? {
        return Ok(PageClass::Neither);
    }
    if !inspector.is_page_fully_loaded().await? {
        debug!("页面尚未加载完成");
        return Ok(PageClass::Neither);
    }
    if !inspector.is_step_container_present().await? {
        debug!("步骤条尚未渲染");
        return Ok(PageClass::Neither);
    }
    if inspector.is_target_step1_page().await? {
        return Ok(PageClass::FormStep1);
    }
    Ok(PageClass::Neither)
}

pub struct PageWatcher {
    inspector: Arc<dyn PageInspector>,
    interval: Duration,
    last: Option<(String, PageClass)>,
}

impl PageWatcher {
    pub fn new(inspector: Arc<dyn PageInspector>, interval: Duration) -> Self {
        Self {
            inspector,
            interval,
            last: None,
        }
    }

    /// 检查一次页面；分类或地址发生变化时返回事件
    ///
    /// 页面查询出错（例如正在跳转）时本轮跳过，不改变记录的状态
    pub async fn poll_once(&mut self) -> Option<PageEvent> {
        let url = match self.inspector.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("获取页面地址失败: {}", e);
                return None;
            }
        };
        let class = match classify(self.inspector.as_ref()).await {
            Ok(class) => class,
            Err(e) => {
                debug!("页面分类失败: {}", e);
                return None;
            }
        };

        let changed = self
            .last
            .as_ref()
            .map_or(true, |(last_url, last_class)| {
                *last_url != url || *last_class != class
            });
        if !changed {
            return None;
        }

        self.last = Some((url.clone(), class));
        Some(PageEvent { url, class })
    }

    /// 持续轮询，直到控制器一侧关闭接收端
    pub async fn run(mut self, tx: mpsc::Sender<PageEvent>) {
        info!("👀 页面观察者启动，轮询间隔 {}ms", self.interval.as_millis());
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(event) = self.poll_once().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
        debug!("页面观察者退出");
    }
}
