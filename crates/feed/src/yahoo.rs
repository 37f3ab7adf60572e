use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use decidra_core::common::TimeFrame;
use decidra_core::market::entity::{Candle, KlineSeries, Quote};
use decidra_core::market::error::MarketError;
use decidra_core::market::port::MarketDataProvider;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// # Summary
/// Yahoo Finance 行情提供者实现，只支持报价与 K 线两类数据流。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯。
/// - 盘口、逐笔、经纪队列、资金流向沿用端口默认实现，返回 `Unsupported`。
#[derive(Clone)]
pub struct YahooProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    // chart 接口地址，不含证券代码
    base_url: String,
    // K 线数据流使用的周期
    timeframe: TimeFrame,
}

impl YahooProvider {
    /// # Summary
    /// 创建指向 Yahoo 公共接口的实例。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时。
    /// 2. 设置浏览器 User-Agent 以减少被拦截风险。
    ///
    /// # Returns
    /// HTTP 客户端构建失败时返回 `MarketError::Network`。
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// 使用自定义的 chart 接口地址创建实例。
    pub fn with_base_url(base_url: &str) -> Result<Self, MarketError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeframe: TimeFrame::Minute1,
        })
    }

    /// 设置 K 线数据流的周期，默认 1 分钟。
    pub fn with_timeframe(mut self, timeframe: TimeFrame) -> Self {
        self.timeframe = timeframe;
        self
    }

    async fn fetch_chart(&self, code: &str, interval: &str, range: &str) -> Result<String, MarketError> {
        let url = format!("{}/{}", self.base_url, code);
        debug!("Requesting Yahoo chart {} interval={} range={}", code, interval, range);

        let resp = self
            .client
            .get(&url)
            .query(&[("interval", interval), ("range", range)])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        // 404 同样携带 chart.error，交给解析逻辑统一处理
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(MarketError::Network(format!("HTTP {}", status)));
        }
        Ok(body)
    }
}

/// Yahoo API 响应顶层结构，映射自 v8 chart 接口。
#[derive(Deserialize, Debug)]
struct YahooResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: YahooMeta,
    // 无成交的区间没有该字段
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

/// # Summary
/// 行情元数据，报价快照取自这里。
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    regular_market_price: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_time: Option<i64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    // 调整后的价格数据
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Deserialize, Debug)]
struct YahooAdjClose {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo API 原始 OHLCV 序列，停牌或无成交的位置为 null。
#[derive(Deserialize, Debug, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn interval_of(timeframe: TimeFrame) -> &'static str {
    match timeframe {
        TimeFrame::Minute1 => "1m",
        TimeFrame::Minute5 => "5m",
        TimeFrame::Hour1 => "60m",
        TimeFrame::Day1 => "1d",
    }
}

/// 每个周期请求的回溯范围。
fn range_of(timeframe: TimeFrame) -> &'static str {
    match timeframe {
        TimeFrame::Minute1 => "1d",
        TimeFrame::Minute5 => "5d",
        TimeFrame::Hour1 => "1mo",
        TimeFrame::Day1 => "6mo",
    }
}

fn cycle_secs(timeframe: TimeFrame) -> i64 {
    match timeframe {
        TimeFrame::Minute1 => 60,
        TimeFrame::Minute5 => 300,
        TimeFrame::Hour1 => 3600,
        TimeFrame::Day1 => 86400,
    }
}

/// # Summary
/// 解析 chart 响应并取出唯一的结果。
///
/// # Logic
/// 1. JSON 结构不符时返回 `Parse`。
/// 2. `chart.error` 为 "Not Found" 时返回 `NotFound`，其余错误返回 `Unknown`。
/// 3. 结果为空时返回 `None`。
fn parse_result(body: &str) -> Result<Option<YahooResult>, MarketError> {
    let resp: YahooResponse =
        serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))?;
    if let Some(err) = resp.chart.error {
        if err.code == "Not Found" {
            return Err(MarketError::NotFound);
        }
        return Err(MarketError::Unknown(err.description));
    }
    Ok(resp.chart.result.and_then(|mut results| results.pop()))
}

fn valid_values(values: Option<&Vec<Option<f64>>>) -> Vec<f64> {
    values
        .map(|v| v.iter().flatten().copied().collect())
        .unwrap_or_default()
}

fn timestamp_of(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// # Summary
/// 从 chart 响应中提取报价快照。
///
/// # Logic
/// 1. 最新价、日内高低、成交量、昨收取自 `meta`。
/// 2. 开盘价取序列中第一个有效值；缺失的日内高低与成交量由序列补齐。
/// 3. 成交额按 `最新价 * 成交量` 估算。
///
/// # Arguments
/// * `code`: 证券代码。
/// * `body`: 响应正文。
///
/// # Returns
/// 没有最新价时返回 `None`。
pub fn parse_quote(code: &str, body: &str) -> Result<Option<Quote>, MarketError> {
    let Some(result) = parse_result(body)? else {
        return Ok(None);
    };
    let meta = &result.meta;
    let Some(last_price) = meta.regular_market_price else {
        return Ok(None);
    };

    let series = result.indicators.quote.first();
    let opens = valid_values(series.map(|q| &q.open));
    let highs = valid_values(series.map(|q| &q.high));
    let lows = valid_values(series.map(|q| &q.low));
    let volumes = valid_values(series.map(|q| &q.volume));

    let open = opens.first().copied().unwrap_or(last_price);
    let high = meta
        .regular_market_day_high
        .unwrap_or_else(|| highs.iter().copied().fold(last_price, f64::max));
    let low = meta
        .regular_market_day_low
        .unwrap_or_else(|| lows.iter().copied().fold(last_price, f64::min));
    let volume = meta
        .regular_market_volume
        .unwrap_or_else(|| volumes.iter().sum());
    let prev_close = meta
        .chart_previous_close
        .or(meta.previous_close)
        .unwrap_or(last_price);
    let timestamp = meta
        .regular_market_time
        .and_then(timestamp_of)
        .unwrap_or_else(Utc::now);

    Ok(Some(Quote {
        code: code.to_string(),
        last_price,
        open,
        high,
        low,
        prev_close,
        volume,
        turnover: last_price * volume,
        timestamp,
    }))
}

/// # Summary
/// 从 chart 响应中提取 K 线序列。
///
/// # Logic
/// 1. 跳过任一 OHLCV 字段为 null 的位置。
/// 2. 合并 adjclose（若存在）。
/// 3. `time + 周期 <= now` 的 K 线标记为已收盘。
///
/// # Arguments
/// * `code`: 证券代码。
/// * `timeframe`: K 线周期。
/// * `body`: 响应正文。
/// * `now`: 判断收盘使用的当前时间。
///
/// # Returns
/// 没有任何有效 K 线时返回 `None`。
pub fn parse_klines(
    code: &str,
    timeframe: TimeFrame,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Option<KlineSeries>, MarketError> {
    let Some(result) = parse_result(body)? else {
        return Ok(None);
    };
    let quote = result
        .indicators
        .quote
        .first()
        .ok_or(MarketError::Parse("No quote data".into()))?;
    let adj_close_list = result
        .indicators
        .adjclose
        .as_ref()
        .and_then(|v| v.first())
        .map(|v| &v.adjclose);
    let cycle = chrono::Duration::seconds(cycle_secs(timeframe));

    let mut candles = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        if let (Some(time), Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            timestamp_of(ts),
            quote.open.get(i).and_then(|x| *x),
            quote.high.get(i).and_then(|x| *x),
            quote.low.get(i).and_then(|x| *x),
            quote.close.get(i).and_then(|x| *x),
            quote.volume.get(i).and_then(|x| *x),
        ) {
            candles.push(Candle {
                time,
                open: o,
                high: h,
                low: l,
                close: c,
                adj_close: adj_close_list.and_then(|list| list.get(i)).and_then(|x| *x),
                volume: v,
                is_final: time + cycle <= now,
            });
        }
    }

    if candles.is_empty() {
        return Ok(None);
    }
    Ok(Some(KlineSeries {
        code: code.to_string(),
        timeframe,
        candles,
        timestamp: now,
    }))
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    /// # Summary
    /// 获取实时报价。
    ///
    /// # Logic
    /// 请求当日 1 分钟 chart，报价字段取自 `meta`。
    async fn fetch_quote(&self, code: &str) -> Result<Option<Quote>, MarketError> {
        let body = self.fetch_chart(code, "1m", "1d").await?;
        parse_quote(code, &body)
    }

    /// # Summary
    /// 获取 K 线序列。
    ///
    /// # Logic
    /// 1. 按配置的周期映射 Yahoo 的 interval 与回溯范围。
    /// 2. 最后一根未走完周期的 K 线标记为未收盘。
    async fn fetch_klines(&self, code: &str) -> Result<Option<KlineSeries>, MarketError> {
        let body = self
            .fetch_chart(code, interval_of(self.timeframe), range_of(self.timeframe))
            .await?;
        parse_klines(code, self.timeframe, &body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_mapping() {
        assert_eq!(interval_of(TimeFrame::Hour1), "60m");
        assert_eq!(range_of(TimeFrame::Day1), "6mo");
        assert_eq!(cycle_secs(TimeFrame::Minute5), 300);
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        assert!(matches!(
            parse_quote("AAPL", "<html>rate limited</html>"),
            Err(MarketError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_result_is_none() {
        let body = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(parse_quote("AAPL", body).unwrap().is_none());
        assert!(
            parse_klines("AAPL", TimeFrame::Minute1, body, Utc::now())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_other_chart_errors_are_unknown() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid interval"}}}"#;
        assert!(matches!(
            parse_klines("AAPL", TimeFrame::Minute1, body, Utc::now()),
            Err(MarketError::Unknown(msg)) if msg == "Invalid interval"
        ));
    }
}
