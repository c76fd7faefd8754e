use std::io::Cursor;

use anyhow::Context;
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{ImageFormat, Rgb, RgbImage};

use super::HEADER;

/// Each font pixel is drawn as a square of this side.
const SCALE: u32 = 2;
/// Horizontal space taken by one character.
const ADVANCE: u32 = 8 * SCALE;
const MARGIN: u32 = 10;
const HEADER_TOP: u32 = 14;
const RULE_Y: u32 = 40;
const FIRST_ROW_TOP: u32 = 54;
const LINE: u32 = 30;
const BOTTOM: u32 = 75;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Three dots on the baseline, the font has no glyph for it.
const ELLIPSIS: [u8; 8] = [0, 0, 0, 0, 0, 0, 0x49, 0];

fn glyph(c: char) -> [u8; 8] {
    if c == '…' {
        return ELLIPSIS;
    }
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or_default()
}

/// `(width, height)` of a table of `rows` lines, the widest being `columns` characters.
fn size(columns: usize, rows: usize) -> (u32, u32) {
    (
        MARGIN * 2 + columns as u32 * ADVANCE,
        BOTTOM + rows as u32 * LINE,
    )
}

fn draw_text(image: &mut RgbImage, text: &str, left: u32, top: u32) {
    for (index, c) in text.chars().enumerate() {
        let x = left + index as u32 * ADVANCE;

        for (dy, bits) in glyph(c).iter().enumerate() {
            for dx in 0..8 {
                if bits >> dx & 1 == 0 {
                    continue;
                }
                for py in 0..SCALE {
                    for px in 0..SCALE {
                        image.put_pixel(
                            x + dx * SCALE + px,
                            top + dy as u32 * SCALE + py,
                            BLACK,
                        );
                    }
                }
            }
        }
    }
}

/// Draws the schedule table, header and rule included, as a png.
pub fn png(rows: &[String]) -> Result<Vec<u8>, anyhow::Error> {
    let columns = rows
        .iter()
        .map(|row| row.chars().count())
        .chain(std::iter::once(HEADER.chars().count()))
        .max()
        .unwrap_or_default();
    let (width, height) = size(columns, rows.len());

    let mut image = RgbImage::from_pixel(width, height, WHITE);
    draw_text(&mut image, HEADER, MARGIN, HEADER_TOP);
    for x in MARGIN..width - MARGIN {
        image.put_pixel(x, RULE_Y, BLACK);
    }
    for (index, row) in rows.iter().enumerate() {
        draw_text(&mut image, row, MARGIN, FIRST_ROW_TOP + index as u32 * LINE);
    }

    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .context("failed to encode the schedule picture")?;
    Ok(data)
}
