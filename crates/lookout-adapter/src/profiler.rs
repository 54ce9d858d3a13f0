//! `HeapProfiler` and `Profiler` domain handlers.

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lookout_engine::HeapStatsEntry;
use lookout_protocol::request::{
    GetHeapObjectIdParams, GetObjectByHeapObjectIdParams, StartSamplingParams,
    TakeHeapSnapshotParams,
};
use lookout_protocol::{
    AddHeapSnapshotChunk, GetObjectByHeapObjectIdResult, HeapObjectIdResult, HeapStatsUpdate,
    LastSeenObjectId, ProfileResult, ReportHeapSnapshotProgress, Response,
};

use crate::convert::ObjectOptions;
use crate::error::AdapterError;
use crate::handler::Shared;
use crate::remote_objects::CONSOLE_GROUP;

/// Cause reported to the engine for client-requested collections.
const GC_CAUSE: &str = "inspector";

/// `io::Write` sink that hands a heap snapshot to `emit` in chunks of at
/// most `chunk_size` bytes, never splitting a UTF-8 sequence.
struct ChunkWriter<F: FnMut(String)> {
    emit: F,
    chunk_size: usize,
    buffer: Vec<u8>,
    chunks: usize,
}

impl<F: FnMut(String)> ChunkWriter<F> {
    fn new(chunk_size: usize, emit: F) -> Self {
        Self {
            emit,
            chunk_size: chunk_size.max(4),
            buffer: Vec::new(),
            chunks: 0,
        }
    }

    fn emit_prefix(&mut self, len: usize) {
        let bytes: Vec<u8> = self.buffer.drain(..len).collect();
        (self.emit)(String::from_utf8_lossy(&bytes).into_owned());
        self.chunks += 1;
    }

    /// Largest prefix of at most `chunk_size` bytes ending on a char boundary.
    fn split_point(&self) -> usize {
        let limit = self.chunk_size.min(self.buffer.len());
        let mut end = limit;
        while end > 0 && end < self.buffer.len() && (self.buffer[end] & 0xC0) == 0x80 {
            end -= 1;
        }
        if end == 0 {
            limit
        } else {
            end
        }
    }

    /// Emit whatever is left. Returns the number of chunks sent.
    fn finish(mut self) -> usize {
        while !self.buffer.is_empty() {
            let end = self.split_point();
            self.emit_prefix(end);
        }
        self.chunks
    }
}

impl<F: FnMut(String)> io::Write for ChunkWriter<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() > self.chunk_size {
            let end = self.split_point();
            self.emit_prefix(end);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn parse_profile(text: &str) -> Result<serde_json::Value, AdapterError> {
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!(error = %e, "engine produced an unparseable profile");
        AdapterError::ProfileParse
    })
}

impl Shared {
    /// Stream a heap snapshot; `stop_tracking` also ends heap-object
    /// tracking first (`HeapProfiler.stopTrackingHeapObjects`).
    pub(crate) fn take_heap_snapshot(
        &self,
        id: i64,
        params: TakeHeapSnapshotParams,
        stop_tracking: bool,
    ) {
        self.enqueue_request(id, move |ctx| {
            if stop_tracking {
                ctx.shared.heap_tracking.store(false, Ordering::SeqCst);
                ctx.engine.instrumentation().stop_tracking_heap_objects();
            }
            if params.report_progress.unwrap_or(false) {
                ctx.shared.notify(
                    ReportHeapSnapshotProgress::METHOD,
                    &ReportHeapSnapshotProgress {
                        done: 1,
                        total: 1,
                        finished: Some(true),
                    },
                );
            }

            let shared = ctx.shared;
            let mut writer = ChunkWriter::new(shared.options.heap_snapshot_chunk_size, |chunk| {
                shared.notify(AddHeapSnapshotChunk::METHOD, &AddHeapSnapshotChunk { chunk });
            });
            ctx.engine
                .instrumentation()
                .write_heap_snapshot(&mut writer, params.capture_numeric_value.unwrap_or(false))
                .map_err(|e| AdapterError::Engine(e.to_string()))?;
            let chunks = writer.finish();
            tracing::debug!(chunks, "heap snapshot sent");
            Ok(Response::ok(id))
        });
    }

    pub(crate) fn start_tracking_heap_objects(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            let weak = ctx.shared.weak_self.clone();
            let report = move |last_seen: u64, timestamp: Duration, stats: &[HeapStatsEntry]| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                shared.notify(
                    LastSeenObjectId::METHOD,
                    &LastSeenObjectId {
                        last_seen_object_id: last_seen,
                        timestamp: timestamp.as_secs_f64() * 1000.0,
                    },
                );
                let stats_update = stats
                    .iter()
                    .flat_map(|entry| [entry.fragment_index, entry.count, entry.size])
                    .collect();
                shared.notify(HeapStatsUpdate::METHOD, &HeapStatsUpdate { stats_update });
            };
            ctx.engine
                .instrumentation()
                .start_tracking_heap_objects(Box::new(report));
            ctx.shared.heap_tracking.store(true, Ordering::SeqCst);
            Ok(Response::ok(id))
        });
    }

    pub(crate) fn start_sampling(&self, id: i64, params: StartSamplingParams) {
        let interval = params
            .sampling_interval
            .filter(|i| *i > 0.0)
            .map_or(self.options.heap_sampling_interval, |i| i as u64);
        self.enqueue_request(id, move |ctx| {
            ctx.engine.instrumentation().start_heap_sampling(interval);
            Ok(Response::ok(id))
        });
    }

    pub(crate) fn stop_sampling(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            let text = ctx.engine.instrumentation().stop_heap_sampling();
            let profile = parse_profile(&text)?;
            Ok(Response::with_result(id, &ProfileResult { profile }))
        });
    }

    pub(crate) fn collect_garbage(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            ctx.engine.instrumentation().collect_garbage(GC_CAUSE);
            Ok(Response::ok(id))
        });
    }

    pub(crate) fn get_object_by_heap_object_id(
        &self,
        id: i64,
        params: GetObjectByHeapObjectIdParams,
    ) -> Result<(), AdapterError> {
        let heap_id: u64 = params
            .object_id
            .parse()
            .map_err(|_| AdapterError::ObjectNotAvailable)?;
        let group = params
            .object_group
            .unwrap_or_else(|| CONSOLE_GROUP.to_string());
        self.enqueue_request(id, move |ctx| {
            let value = ctx
                .engine
                .instrumentation()
                .object_for_heap_id(heap_id)
                .ok_or(AdapterError::ObjectNotAvailable)?;
            let result = ctx.remote_object(&value, &group, ObjectOptions::default());
            Ok(Response::with_result(
                id,
                &GetObjectByHeapObjectIdResult { result },
            ))
        });
        Ok(())
    }

    pub(crate) fn get_heap_object_id(&self, id: i64, params: GetHeapObjectIdParams) {
        self.enqueue_request(id, move |ctx| {
            let value = ctx.lookup_value(&params.object_id)?;
            let heap_id = ctx
                .engine
                .instrumentation()
                .heap_object_id(&value)
                .ok_or(AdapterError::ObjectNotAvailable)?;
            Ok(Response::with_result(
                id,
                &HeapObjectIdResult {
                    heap_snapshot_object_id: heap_id.to_string(),
                },
            ))
        });
    }

    pub(crate) fn profiler_start(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            ctx.engine.instrumentation().start_profiler();
            tracing::debug!("sampling profiler started");
            Ok(Response::ok(id))
        });
    }

    pub(crate) fn profiler_stop(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            let text = ctx.engine.instrumentation().stop_profiler();
            let profile = parse_profile(&text)?;
            Ok(Response::with_result(id, &ProfileResult { profile }))
        });
    }
}
