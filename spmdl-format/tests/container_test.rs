//! Container round trip tests
//!
//! Every section must decode back to exactly the bytes that went in, whether
//! it was stored compressed or raw.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use spmdl_format::formats::fourcc;
use spmdl_format::{
    CompressOptions, CompressedSection, CompressionKind, ContainerBuilder, ContainerReader,
};

const MAGIC: u32 = fourcc(b"TEST");

/// Payloads ranging from incompressible noise to long runs
fn sample_payloads(rng: &mut Pcg32) -> Vec<Vec<u8>> {
    let noise: Vec<u8> = (0..3000).map(|_| rng.random()).collect();
    let runs: Vec<u8> = (0..5000).map(|i| (i / 100) as u8).collect();
    let mixed: Vec<u8> = (0..2048)
        .map(|i| if i % 8 == 0 { rng.random() } else { 0 })
        .collect();
    vec![noise, runs, Vec::new(), vec![42], mixed]
}

#[test]
fn test_section_round_trip() {
    let mut rng = Pcg32::seed_from_u64(0x5eed);
    let payloads = sample_payloads(&mut rng);

    for level in [1, 3, 10, 20] {
        let options = CompressOptions {
            level,
            ..Default::default()
        };

        let mut builder = ContainerBuilder::new(MAGIC, b"info".to_vec());
        for (i, payload) in payloads.iter().enumerate() {
            let section =
                CompressedSection::compress(fourcc(b"DATA"), i as u32, payload.clone(), &options)
                    .expect("compression failed");
            builder.push(section);
        }
        let bytes = builder.build().expect("build failed");

        let reader = ContainerReader::parse(&bytes, Some(MAGIC)).expect("parse failed");
        assert_eq!(reader.info(), b"info");
        assert_eq!(reader.sections().len(), payloads.len());

        for (i, payload) in payloads.iter().enumerate() {
            let descriptor = reader.sections()[i];
            assert_eq!(descriptor.uncompressed_size as usize, payload.len());
            assert_eq!(descriptor.offset % 16, 0);
            assert_eq!(reader.payload(i).unwrap().as_ref(), payload.as_slice());
        }
    }
}

#[test]
fn test_ineffective_compression_stored_raw() {
    let mut rng = Pcg32::seed_from_u64(99);
    let noise: Vec<u8> = (0..4096).map(|_| rng.random()).collect();
    let section =
        CompressedSection::compress(1, 0, noise.clone(), &CompressOptions::default()).unwrap();

    assert_eq!(section.kind, CompressionKind::None);
    assert_eq!(section.data, noise);
}

#[test]
fn test_threshold_controls_raw_fallback() {
    // Compresses to roughly half its size
    let mut rng = Pcg32::seed_from_u64(3);
    let payload: Vec<u8> = (0..8192)
        .map(|i| if i % 2 == 0 { rng.random() } else { 0 })
        .collect();

    let strict = CompressOptions {
        level: 10,
        threshold: 0.1,
    };
    let lenient = CompressOptions {
        level: 10,
        threshold: 0.95,
    };

    let raw = CompressedSection::compress(1, 0, payload.clone(), &strict).unwrap();
    assert_eq!(raw.kind, CompressionKind::None);
    assert_eq!(raw.data, payload);

    let packed = CompressedSection::compress(1, 0, payload.clone(), &lenient).unwrap();
    assert_eq!(packed.kind, CompressionKind::Zstd);
    assert!(packed.data.len() < payload.len());
}

#[test]
fn test_corrupt_size_is_rejected() {
    let mut builder = ContainerBuilder::new(MAGIC, Vec::new());
    builder.push(CompressedSection::raw(1, 0, vec![9; 32]));
    let mut bytes = builder.build().unwrap();

    // uncompressed_size of the first descriptor lives at 16 + 20
    bytes[36..40].copy_from_slice(&31u32.to_le_bytes());
    let reader = ContainerReader::parse(&bytes, None).unwrap();
    assert!(reader.payload(0).is_err());
}
