use crate::telemetry::{
    decrement_streams_inflight, increment_requests, increment_stream_errors,
    increment_streams_inflight, increment_tokens_streamed, record_stream_duration,
};
use futures::{StreamExt, stream::FuturesUnordered};
use std::{sync::Arc, time::Instant};
use stepstream::{Error, GenerateRequest, RequestId, StreamingEngine};

/// How a single job ended.
#[derive(Debug)]
pub struct JobReport {
    pub request_id: RequestId,
    pub tokens: u64,
    pub outcome: Result<(), Error>,
}

/// Runs every job concurrently against `engine` and waits for all of them.
///
/// Individual job failures are reported, not propagated. Only a job task
/// that could not be joined is an error here.
pub async fn run_jobs(
    engine: Arc<StreamingEngine>,
    jobs: Vec<GenerateRequest>,
) -> anyhow::Result<Vec<JobReport>> {
    let mut tasks = FuturesUnordered::new();
    for request in jobs {
        tasks.push(tokio::spawn(run_job(Arc::clone(&engine), request)));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.next().await {
        reports.push(joined?);
    }
    Ok(reports)
}

#[tracing::instrument(skip_all, fields(request_id = %request.request_id))]
async fn run_job(engine: Arc<StreamingEngine>, request: GenerateRequest) -> JobReport {
    increment_requests();
    increment_streams_inflight();
    let start = Instant::now();

    let request_id = request.request_id.clone();
    let mut tokens = 0;
    let outcome = stream_tokens(&engine, request, &mut tokens).await;

    decrement_streams_inflight();
    record_stream_duration(start.elapsed().as_secs_f64() * 1000.0);
    increment_tokens_streamed(tokens);

    match &outcome {
        Ok(()) => tracing::info!(tokens, "Job finished"),
        Err(err) => {
            increment_stream_errors();
            tracing::warn!(tokens, "Job failed: {err}");
        }
    }

    JobReport {
        request_id,
        tokens,
        outcome,
    }
}

async fn stream_tokens(
    engine: &StreamingEngine,
    request: GenerateRequest,
    tokens: &mut u64,
) -> Result<(), Error> {
    let request_id = request.request_id.clone();
    let mut stream = engine.generate(request)?;
    while let Some(token) = stream.next().await {
        let token = token?;
        *tokens += 1;
        println!("{request_id}: {token}");
    }
    Ok(())
}
