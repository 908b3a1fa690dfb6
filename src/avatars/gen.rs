//! Deterministic identicon avatars.
//!
//! A 5x5 grid, mirrored around the middle column, drawn in a single
//! foreground color. Both the pattern and the color come from the SHA-256
//! digest of the seed, so the same seed always yields the same pixels.

use image::{codecs::png::PngEncoder, ColorType, ImageBuffer, ImageEncoder, ImageError, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

use crate::users::repo_types::UserIdentity;

/// Edge length of generated and uploaded avatars.
pub const DEFAULT_AVATAR_SIZE: u32 = 256;

const GRID: u32 = 5;
const BACKGROUND: Rgba<u8> = Rgba([240, 240, 240, 255]);

/// Email if present, otherwise the login name.
pub fn avatar_seed(user: &UserIdentity) -> &str {
    user.email
        .as_deref()
        .filter(|e| !e.is_empty())
        .unwrap_or(&user.name)
}

pub fn random_image(seed: &[u8]) -> RgbaImage {
    random_image_size(DEFAULT_AVATAR_SIZE, seed)
}

pub fn random_image_size(size: u32, seed: &[u8]) -> RgbaImage {
    let digest = Sha256::digest(seed);
    let fg = foreground(&digest);
    let cells = pattern(&digest);

    let size = size.max(GRID);
    let margin = size / 10;
    let cell = ((size - 2 * margin) / GRID).max(1);
    let offset = (size - cell * GRID) / 2;

    ImageBuffer::from_fn(size, size, |x, y| {
        if x < offset || y < offset {
            return BACKGROUND;
        }
        let (cx, cy) = ((x - offset) / cell, (y - offset) / cell);
        if cx < GRID && cy < GRID && cells[cy as usize][cx as usize] {
            fg
        } else {
            BACKGROUND
        }
    })
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        ColorType::Rgba8,
    )?;
    Ok(buf)
}

// Channels squeezed into 48..=208 so the color is never lost against the
// background or pure black.
fn foreground(digest: &[u8]) -> Rgba<u8> {
    let ch = |b: u8| (48 + (b as u32 * 160) / 255) as u8;
    Rgba([ch(digest[0]), ch(digest[1]), ch(digest[2]), 255])
}

fn pattern(digest: &[u8]) -> [[bool; GRID as usize]; GRID as usize] {
    let mut cells = [[false; GRID as usize]; GRID as usize];
    let half = (GRID as usize + 1) / 2;
    for (row, line) in cells.iter_mut().enumerate() {
        for col in 0..half {
            let on = digest[3 + row * half + col] & 1 == 1;
            line[col] = on;
            line[GRID as usize - 1 - col] = on;
        }
    }
    cells
}
