//! Benchmarks for the per-call hot path that does not touch the network
//!
//! This benchmark measures:
//! - Descriptor building and URL resolution
//! - Error envelope parsing into field errors
//! - A full dispatch through an instant in-process transport

use async_trait::async_trait;
use boxoffice_client::error::parse_field_errors;
use boxoffice_client::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use boxoffice_client::{ApiClient, ClientConfig, RequestDescriptor};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::json;
use std::sync::Arc;
use url::Url;

struct Instant200;

#[async_trait]
impl Transport for Instant200 {
    async fn send(&self, _r: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(TransportResponse {
            status: 200,
            headers,
            body: Bytes::from_static(br#"{"success":true,"data":[{"id":"e1"}]}"#),
        })
    }
}

fn bench_url_resolution(c: &mut Criterion) {
    let base = Url::parse("https://api.boxoffice.test/api/v1").unwrap();
    let mut group = c.benchmark_group("url_resolution");

    for params in [0usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("query_params", params), &params, |b, &n| {
            b.iter(|| {
                let mut req = RequestDescriptor::get("/events");
                for i in 0..n {
                    req = req.query(format!("k{}", i), i);
                }
                black_box(req.resolve_url(&base).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_field_errors(c: &mut Criterion) {
    let bodies = [
        json!({"errors": [{"field": "email", "message": "Invalid"}, {"field": "name", "message": "Required"}]}),
        json!({"errors": {"email": ["Invalid", "Taken"], "password": "Too short"}}),
        json!({"errorMessages": [{"path": "body.email", "message": "Invalid"}, {"path": "query.page", "message": "NaN"}]}),
    ];
    let mut group = c.benchmark_group("field_errors");
    group.throughput(Throughput::Elements(bodies.len() as u64));
    group.bench_function("parse_all_shapes", |b| {
        b.iter(|| {
            for body in &bodies {
                black_box(parse_field_errors(black_box(body)));
            }
        })
    });
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = ApiClient::builder()
        .config(ClientConfig::new("https://api.boxoffice.test/api/v1"))
        .transport(Arc::new(Instant200))
        .build()
        .unwrap();

    c.bench_function("dispatch_instant_transport", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(client.send(RequestDescriptor::get("/events")).await.unwrap()) })
    });
}

criterion_group!(
    benches,
    bench_url_resolution,
    bench_field_errors,
    bench_dispatch
);
criterion_main!(benches);
