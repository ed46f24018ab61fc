use snapgif_core::{CaptureConfig, Repeat};
use snapgif_encoder::{EncoderSettings, GifWriter};
use std::io::Cursor;

struct Decoded {
    width: u16,
    height: u16,
    repeat: gif::Repeat,
    frames: Vec<(u16, Vec<u8>)>,
}

fn decode(data: &[u8]) -> Decoded {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(Cursor::new(data)).unwrap();
    let width = decoder.width();
    let height = decoder.height();

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        frames.push((frame.delay, frame.buffer.to_vec()));
    }

    Decoded {
        width,
        height,
        repeat: decoder.repeat(),
        frames,
    }
}

/// Four flat quadrants whose colors shift with `seed`
fn quadrants(width: usize, height: usize, seed: u8) -> Vec<u8> {
    let colors = [
        [200u8.wrapping_add(seed), 20, 20],
        [20, 180, 40u8.wrapping_add(seed)],
        [30, 30u8.wrapping_add(seed), 220],
        [240, 240, 240u8.wrapping_sub(seed)],
    ];
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let q = (x * 2 / width) + 2 * (y * 2 / height);
            pixels.extend_from_slice(&colors[q]);
        }
    }
    pixels
}

fn encode(settings: EncoderSettings, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = GifWriter::new(settings);
    writer.start(Vec::new()).unwrap();
    for frame in frames {
        writer.add_frame(frame).unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn twenty_frame_scenario() {
    let config = CaptureConfig::new()
        .with_width(100)
        .with_height(50)
        .with_fps(10)
        .with_quality(15)
        .with_repeat(0);
    config.validate().unwrap();
    let settings = EncoderSettings::from_config(&config);

    let frames: Vec<_> = (0..20).map(|i| quadrants(100, 50, i * 3)).collect();
    let data = encode(settings, &frames);

    assert_eq!(&data[..6], b"GIF89a");
    let decoded = decode(&data);
    assert_eq!((decoded.width, decoded.height), (100, 50));
    assert_eq!(decoded.repeat, gif::Repeat::Infinite);
    assert_eq!(decoded.frames.len(), 20);
    assert!(decoded.frames.iter().all(|(delay, _)| *delay == 10));
}

#[test]
fn colors_survive_within_palette_error() {
    let settings = EncoderSettings {
        width: 64,
        height: 32,
        repeat: Repeat::Finite(2),
        quality: 10,
        frame_delay_ms: 40,
    };
    let frames: Vec<_> = (0..3).map(|i| quadrants(64, 32, i * 10)).collect();
    let decoded = decode(&encode(settings, &frames));

    assert_eq!(decoded.repeat, gif::Repeat::Finite(2));
    assert_eq!(decoded.frames.len(), frames.len());
    for ((delay, rgba), original) in decoded.frames.iter().zip(&frames) {
        assert_eq!(*delay, 4);
        for (out, src) in rgba.chunks_exact(4).zip(original.chunks_exact(3)) {
            for c in 0..3 {
                let err = (out[c] as i32 - src[c] as i32).abs();
                assert!(err <= 16, "channel error {} ({:?} vs {:?})", err, &out[..3], src);
            }
        }
    }
}

#[test]
fn solid_frames_decode() {
    let settings = EncoderSettings {
        width: 16,
        height: 16,
        repeat: Repeat::Disabled,
        quality: 1,
        frame_delay_ms: 100,
    };
    let frame = [10u8, 200, 90].repeat(16 * 16);
    let data = encode(settings, &[frame.clone(), frame]);

    assert!(!data.windows(11).any(|w| w == b"NETSCAPE2.0"));
    let decoded = decode(&data);
    assert_eq!(decoded.frames.len(), 2);
    for (_, rgba) in &decoded.frames {
        for px in rgba.chunks_exact(4) {
            assert!((px[1] as i32 - 200).abs() <= 4);
        }
    }
}

#[test]
fn file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.gif");
    let settings = EncoderSettings {
        width: 8,
        height: 8,
        repeat: Repeat::Infinite,
        quality: 10,
        frame_delay_ms: 50,
    };

    let mut writer = GifWriter::new(settings);
    writer.create(&path).unwrap();
    writer.add_frame(&quadrants(8, 8, 0)).unwrap();
    drop(writer.finish().unwrap());

    let data = std::fs::read(&path).unwrap();
    assert_eq!(decode(&data).frames.len(), 1);
}
