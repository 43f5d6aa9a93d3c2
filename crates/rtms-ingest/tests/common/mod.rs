//! Shared helpers for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use rtms_common::{RegionCode, YearMonth};
use rtms_ingest::config::ApiConfig;
use rtms_ingest::retry::{Backoff, RetryPolicy};
use rtms_ingest::store::{StoreError, TabularStore, Table};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_PATH: &str = "/getRTMSDataSvcAptTrade";

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Vec<String>>,
    failing_appends: usize,
    failing_reads: bool,
    append_calls: usize,
}

/// In-memory store shared between a pipeline and the test that inspects it
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().rows = rows;
        store
    }

    /// Reject the next `count` appends
    pub fn fail_next_appends(&self, count: usize) {
        self.inner.lock().unwrap().failing_appends = count;
    }

    pub fn fail_reads(&self) {
        self.inner.lock().unwrap().failing_reads = true;
    }

    /// Every row including the header
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().rows.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.inner.lock().unwrap().append_calls
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn read_table(&self) -> Result<Table, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_reads {
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        Ok(Table::from_rows(inner.rows.clone()))
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.append_calls += 1;
        if inner.failing_appends > 0 {
            inner.failing_appends -= 1;
            return Err(StoreError::Rejected("quota exceeded".to_string()));
        }
        inner.rows.extend(rows);
        Ok(())
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn region(code: &str) -> RegionCode {
    RegionCode::parse(code).unwrap()
}

pub fn month(raw: &str) -> YearMonth {
    YearMonth::parse(raw).unwrap()
}

/// One `<item>` whose identity fields vary only in amount
pub fn item(amount: &str, sgg: &str) -> String {
    format!(
        "<item><aptNm>래미안</aptNm><dealAmount>{amount}</dealAmount><dealYear>2025</dealYear>\
         <dealMonth>1</dealMonth><dealDay>5</dealDay><excluUseAr>84.9</excluUseAr>\
         <jibun>100</jibun><floor>7</floor><sggCd>{sgg}</sggCd><umdCd>10100</umdCd></item>"
    )
}

pub fn page(code: &str, items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response><header><resultCode>{code}</resultCode>\
         <resultMsg>OK</resultMsg></header><body><items>{}</items><numOfRows>1000</numOfRows>\
         <pageNo>1</pageNo><totalCount>{}</totalCount></body></response>",
        items.concat(),
        items.len()
    )
}

pub fn success_page(items: &[String]) -> String {
    page("000", items)
}

pub fn no_data_page() -> String {
    page("03", &[])
}

pub fn credential_error_page() -> String {
    "<OpenAPI_ServiceResponse><cmmMsgHeader><errMsg>SERVICE ERROR</errMsg>\
     <returnAuthMsg>SERVICE_KEY_IS_NOT_REGISTERED_ERROR</returnAuthMsg>\
     <returnReasonCode>30</returnReasonCode></cmmMsgHeader></OpenAPI_ServiceResponse>"
        .to_string()
}

/// API settings pointed at a mock server, with near-zero delays
pub fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        service_key: "test-key".to_string(),
        base_url: format!("{}{}", server.uri(), API_PATH),
        request_delay_ms: 0,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff: Backoff::Fixed,
        },
        ..ApiConfig::default()
    }
}

/// Mount the given pages for a unit, followed by an empty success page
pub async fn mount_unit(server: &MockServer, region: &str, month: &str, pages: &[String]) {
    for (index, body) in pages
        .iter()
        .cloned()
        .chain(std::iter::once(success_page(&[])))
        .enumerate()
    {
        Mock::given(method("GET"))
            .and(path(API_PATH))
            .and(query_param("LAWD_CD", region))
            .and(query_param("DEAL_YMD", month))
            .and(query_param("pageNo", (index + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }
}

/// Mount a single response for every page of a unit
pub async fn mount_unit_response(
    server: &MockServer,
    region: &str,
    month: &str,
    response: ResponseTemplate,
    expected_calls: u64,
) {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("LAWD_CD", region))
        .and(query_param("DEAL_YMD", month))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}
