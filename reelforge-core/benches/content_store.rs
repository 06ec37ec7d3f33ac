//! Benchmarks the content-hash computation and the content-store
//! directory-size walk.
//!
//! Run with: cargo bench -p reelforge-core --bench content_store

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reelforge_core::content_store::ContentStore;
use reelforge_core::models::{Container, MediaId, TranscodeRequest};
use tokio::runtime::Runtime;

fn sample_request() -> TranscodeRequest {
    TranscodeRequest {
        media_id: MediaId::from_string("media-bench-001".to_string()),
        input_path: "/library/movies/bench.mkv".to_string(),
        container: Container::Hls,
        video_codec: "h264".to_string(),
        audio_codec: "aac".to_string(),
        quality: TranscodeRequest::default_quality(),
        speed_priority: "balanced".to_string(),
        resolution: Some(reelforge_core::models::Resolution { width: 1920, height: 1080 }),
        video_bitrate_kbps: Some(4000),
        audio_bitrate_kbps: Some(128),
        enable_abr: true,
        session_id: "client-session".to_string(),
    }
}

fn bench_content_hash(c: &mut Criterion) {
    let request = sample_request();

    c.bench_function("transcode_request_content_hash", |b| {
        b.iter(|| black_box(request.content_hash()));
    });
}

fn bench_directory_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::new(tmp.path());

    rt.block_on(async {
        for shard in 0..8 {
            let dir = tmp.path().join(format!("shard-{shard}"));
            tokio::fs::create_dir_all(&dir).await.unwrap();
            for segment in 0..32 {
                let path = dir.join(format!("segment-{segment}.m4s"));
                tokio::fs::write(&path, vec![0u8; 4096]).await.unwrap();
            }
        }
    });

    c.bench_function("content_store_directory_size", |b| {
        b.to_async(&rt).iter(|| async { black_box(store.directory_size(tmp.path()).await.unwrap()) });
    });
}

criterion_group!(benches, bench_content_hash, bench_directory_size);
criterion_main!(benches);
