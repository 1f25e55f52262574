use std::fs::File;
use std::io::Write;

use tzp::block::{decode_block, FLAG_DELTA, FLAG_RLE, INDEX_ENTRY_SIZE};
use tzp::codec::ALGO_STORED;
use tzp::header::HEADER_SIZE;
use tzp::reader::{decompress_bytes, decompress_file, parse, read_info};
use tzp::writer::{compress_bytes, compress_file, CompressOptions};
use tzp::{CancelToken, ContentClass, Profile, TzpError};

fn compress(data: &[u8]) -> Vec<u8> {
    compress_with(data, CompressOptions::default())
}

fn compress_with(data: &[u8], options: CompressOptions) -> Vec<u8> {
    compress_bytes(data, &options, &CancelToken::new()).unwrap().0
}

fn decompress(file: &[u8]) -> Vec<u8> {
    decompress_bytes(file, 0, &CancelToken::new()).unwrap()
}

fn roundtrip(data: &[u8]) {
    assert_eq!(decompress(&compress(data)), data, "len {}", data.len());
}

fn xorshift64(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

// ── Round-trip matrix ────────────────────────────────────────────────────────

#[test]
fn roundtrip_empty() {
    let file = compress(b"");
    assert_eq!(decompress(&file), b"");

    let info = parse(&file).unwrap();
    assert_eq!(info.header.block_count, 0);
    assert_eq!(info.header.original_len, 0);
    assert_eq!(
        file.len(),
        HEADER_SIZE + info.header.metadata_len as usize,
        "payload region must be empty"
    );
}

#[test]
fn roundtrip_single_byte() {
    roundtrip(b"x");
    roundtrip(&[0u8]);
    roundtrip(&[0xFF]);
}

#[test]
fn roundtrip_around_block_boundaries() {
    // High-entropy input pins the base block size to 64 KiB, so these
    // lengths exercise the exact-fit, one-short, and one-over cases.
    let block = 64 * 1024;
    for len in [block - 1, block, block + 1] {
        roundtrip(&xorshift64(11, len));
    }
    // Same boundary cases for a 1 MiB text plan.
    let mib = 1024 * 1024;
    let text: Vec<u8> = b"text content without much structure but plenty of words "
        .iter()
        .cycle()
        .take(mib + 1)
        .copied()
        .collect();
    for len in [mib - 1, mib, mib + 1] {
        roundtrip(&text[..len]);
    }
}

#[test]
fn roundtrip_single_byte_fill() {
    roundtrip(&vec![0x00u8; 128 * 1024]);
    roundtrip(&vec![0xABu8; 1024]);
}

#[test]
fn roundtrip_random_bytes() {
    roundtrip(&xorshift64(99, 300_000));
}

#[test]
fn roundtrip_utf8_text() {
    let text = "Grande do que parece: compressão adaptativa por blocos. \
                日本語のテキストも往復します。🚀 "
        .repeat(2000);
    roundtrip(text.as_bytes());
}

#[test]
fn roundtrip_json() {
    let json = r#"{"user":"ana","scores":[10,20,30],"active":true}"#.repeat(5000);
    roundtrip(json.as_bytes());
}

#[test]
fn roundtrip_of_a_compressed_container() {
    // A valid container is itself high-entropy input; it must survive
    // another pass through the engine bit for bit.
    let inner = compress(&xorshift64(5, 100_000));
    roundtrip(&inner);
}

#[test]
fn roundtrip_all_profiles() {
    let data = b"profile sweep data with some repetition repetition repetition ".repeat(300);
    for profile in Profile::ALL {
        let file = compress_with(
            &data,
            CompressOptions {
                profile,
                ..CompressOptions::default()
            },
        );
        assert_eq!(decompress(&file), data, "profile {profile}");
    }
}

// ── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn compression_is_deterministic() {
    let data = xorshift64(42, 500_000);
    for profile in [Profile::Lightning, Profile::Balanced, Profile::Max] {
        let options = CompressOptions {
            profile,
            ..CompressOptions::default()
        };
        let a = compress_with(&data, options.clone());
        let b = compress_with(&data, options);
        assert_eq!(a, b, "profile {profile}");
    }
}

// ── Index invariants ─────────────────────────────────────────────────────────

#[test]
fn index_is_monotonic_and_sizes_sum() {
    let file = compress(&xorshift64(3, 200_000));
    let info = parse(&file).unwrap();
    assert!(info.entries.len() > 1);

    let mut expected_offset = 0u64;
    let mut total = 0u64;
    for entry in &info.entries {
        assert_eq!(entry.payload_offset, expected_offset);
        expected_offset += entry.compressed_size as u64;
        total += entry.original_size as u64;
    }
    assert_eq!(total, info.header.original_len);
}

#[test]
fn blocks_decode_independently() {
    let file = compress(&xorshift64(8, 200_000));
    let info = parse(&file).unwrap();
    // Decode only the last block, using nothing but its entry + payload.
    let index = info.entries.len() - 1;
    let entry = &info.entries[index];
    let start = info.payload_start as usize + entry.payload_offset as usize;
    let end = start + entry.compressed_size as usize;
    let decoded = decode_block(index, entry, &file[start..end]).unwrap();
    assert_eq!(decoded.len(), entry.original_size as usize);
}

#[test]
fn stored_fallback_keeps_payload_verbatim() {
    let data = xorshift64(21, 64 * 1024);
    let file = compress(&data);
    let info = parse(&file).unwrap();
    assert_eq!(info.entries.len(), 1);
    let entry = &info.entries[0];
    assert_eq!(entry.algorithm_code, ALGO_STORED);
    assert_eq!(entry.compressed_size, entry.original_size);
    assert_eq!(entry.flags, 0);
    let start = info.payload_start as usize;
    assert_eq!(&file[start..start + data.len()], &data[..]);
}

// ── Corruption detection ─────────────────────────────────────────────────────

#[test]
fn payload_bit_flips_are_detected() {
    let data = b"corruption detection material ".repeat(200);
    let file = compress(&data);
    let info = parse(&file).unwrap();
    let payload_start = info.payload_start as usize;

    for position in [payload_start, file.len() - 1, payload_start + (file.len() - payload_start) / 2] {
        for bit in [0x01u8, 0x80u8] {
            let mut corrupted = file.clone();
            corrupted[position] ^= bit;
            let result = decompress_bytes(&corrupted, 0, &CancelToken::new());
            assert!(
                matches!(
                    result,
                    Err(TzpError::BlockChecksumMismatch { .. })
                        | Err(TzpError::GlobalChecksumMismatch)
                ),
                "flip at {position} bit {bit:#04x} went unnoticed"
            );
        }
    }
}

#[test]
fn index_bit_flips_are_detected() {
    let file = compress(&xorshift64(17, 130_000));
    let info = parse(&file).unwrap();
    let index_start = HEADER_SIZE + info.header.metadata_len as usize;
    let index_len = info.entries.len() * INDEX_ENTRY_SIZE;

    for offset in 0..index_len {
        let mut corrupted = file.clone();
        corrupted[index_start + offset] ^= 0x01;
        let result = decompress_bytes(&corrupted, 0, &CancelToken::new());
        assert!(
            result.is_err(),
            "index byte {offset} flip went unnoticed"
        );
    }
}

// ── Literal scenarios ────────────────────────────────────────────────────────

#[test]
fn scenario_repetitive_input_engages_rle() {
    let data = vec![b'A'; 1024];
    let file = compress(&data);

    let info = parse(&file).unwrap();
    assert_eq!(
        info.metadata.analysis.content_class,
        ContentClass::Repetitive
    );
    assert_eq!(info.entries.len(), 1);
    assert_eq!(info.entries[0].flags & FLAG_RLE, FLAG_RLE);
    assert!(info.entries[0].compressed_size < 64);
    assert_eq!(decompress(&file), data);
}

#[test]
fn scenario_random_mib_stores_all_blocks() {
    let data = xorshift64(1, 1024 * 1024);
    let file = compress(&data);

    let info = parse(&file).unwrap();
    assert!(info.metadata.analysis.entropy > 7.9);
    assert_eq!(info.header.base_block_size, 64 * 1024);
    assert_eq!(info.entries.len(), 16);
    for entry in &info.entries {
        assert_eq!(entry.algorithm_code, ALGO_STORED);
    }
    assert_eq!(
        file.len(),
        HEADER_SIZE
            + info.header.metadata_len as usize
            + 16 * INDEX_ENTRY_SIZE
            + 1024 * 1024,
        "container overhead is the header, metadata, and 24 bytes per block"
    );
    assert_eq!(decompress(&file), data);
}

#[test]
fn scenario_repeated_json_is_structured_text() {
    let data = br#"{"a":1,"b":2,"c":3}"#.repeat(100_000);
    let file = compress(&data);

    let info = parse(&file).unwrap();
    assert_eq!(
        info.metadata.analysis.content_class,
        ContentClass::StructuredText
    );
    assert_eq!(decompress(&file), data);
}

#[test]
fn scenario_ascending_integers_engage_delta() {
    let data: Vec<u8> = (0u32..262_144).flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(data.len(), 1024 * 1024);
    let file = compress(&data);

    let info = parse(&file).unwrap();
    assert!(
        info.entries
            .iter()
            .any(|entry| entry.flags & FLAG_DELTA != 0),
        "no block carries the delta flag"
    );
    assert_eq!(decompress(&file), data);
}

#[test]
fn scenario_payload_flip_reports_block_zero() {
    let data = vec![b'A'; 1024];
    let mut file = compress(&data);

    let info = parse(&file).unwrap();
    let position = info.payload_start as usize + 10;
    assert!(position < file.len(), "payload shorter than expected");
    file[position] ^= 0xFF;

    match decompress_bytes(&file, 0, &CancelToken::new()) {
        Err(TzpError::BlockChecksumMismatch { index }) => assert_eq!(index, 0),
        other => panic!("expected a block checksum failure, got {other:?}"),
    }
}

// ── File-level API ───────────────────────────────────────────────────────────

#[test]
fn file_roundtrip_via_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input.bin");
    let archive_path = dir.path().join("input.bin.tzp");
    let restored_path = dir.path().join("restored.bin");

    let data = b"file level roundtrip ".repeat(10_000);
    File::create(&input_path)
        .unwrap()
        .write_all(&data)
        .unwrap();

    let summary = compress_file(
        &input_path,
        &archive_path,
        &CompressOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.original_len, data.len() as u64);
    assert!(archive_path.exists());

    let summary = decompress_file(&archive_path, &restored_path, 0, &CancelToken::new()).unwrap();
    assert_eq!(summary.original_len, data.len() as u64);
    assert_eq!(std::fs::read(&restored_path).unwrap(), data);

    let info = read_info(&archive_path).unwrap();
    assert_eq!(info.header.original_len, data.len() as u64);
}

#[test]
fn cancelled_compression_reports_cancelled() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = compress_bytes(&vec![0u8; 10_000], &CompressOptions::default(), &cancel);
    assert!(matches!(result, Err(TzpError::Cancelled)));
}

#[test]
fn cancelled_file_compression_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input.bin");
    let archive_path = dir.path().join("out.tzp");
    File::create(&input_path)
        .unwrap()
        .write_all(&vec![5u8; 50_000])
        .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = compress_file(
        &input_path,
        &archive_path,
        &CompressOptions::default(),
        &cancel,
    );
    assert!(matches!(result, Err(TzpError::Cancelled)));
    assert!(!archive_path.exists(), "no partial output may remain");
}

#[test]
fn filename_hint_flows_into_classification() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("noise.jpg");
    let archive_path = dir.path().join("noise.jpg.tzp");

    // Low-entropy bytes, but the .jpg hint forces the media class and
    // therefore stored blocks.
    File::create(&input_path)
        .unwrap()
        .write_all(&vec![0x20u8; 100_000])
        .unwrap();
    compress_file(
        &input_path,
        &archive_path,
        &CompressOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();

    let info = read_info(&archive_path).unwrap();
    assert_eq!(info.metadata.analysis.content_class, ContentClass::Media);
    assert!(info
        .entries
        .iter()
        .all(|entry| entry.algorithm_code == ALGO_STORED));
}
