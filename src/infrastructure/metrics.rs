// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

/// 初始化指标系统
///
/// 只有配置了 `metrics.listen_addr` 时才安装Prometheus导出器；
/// 未安装时各计数器调用为空操作。
pub fn init_metrics(settings: &MetricsSettings) {
    let Some(listen_addr) = settings.listen_addr.as_deref() else {
        return;
    };

    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}", e);
        return;
    }

    describe_counter!(
        "api_requests_total",
        "Upstream API requests by competition and outcome"
    );
    describe_counter!(
        "raw_rows_total",
        "Raw-layer rows by competition and kind (inserted, updated, rejected, stale)"
    );
    describe_counter!(
        "pipeline_tasks_total",
        "Task state transitions by node kind and state"
    );
    describe_counter!("pipeline_runs_total", "Finished pipeline runs by outcome");

    info!("Metrics exporter listening on {}", addr);
}

/// 记录一次上游请求
pub fn record_api_request(competition: &str, outcome: &'static str) {
    counter!(
        "api_requests_total",
        "competition" => competition.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录原始层行数
pub fn record_raw_rows(competition: &str, kind: &'static str, rows: u64) {
    if rows == 0 {
        return;
    }
    counter!(
        "raw_rows_total",
        "competition" => competition.to_string(),
        "kind" => kind
    )
    .increment(rows);
}

/// 记录任务状态转换，节点按类型（冒号前缀）聚合
pub fn record_task_transition(node_id: &str, state: &str) {
    let kind = node_id.split(':').next().unwrap_or(node_id).to_string();
    counter!(
        "pipeline_tasks_total",
        "node" => kind,
        "state" => state.to_string()
    )
    .increment(1);
}

/// 记录运行结果
pub fn record_run(outcome: &str) {
    counter!("pipeline_runs_total", "outcome" => outcome.to_string()).increment(1);
}
