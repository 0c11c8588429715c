use std::convert::Infallible;

use crate::sim::{BufferId, CellStateBuffer, RenderStage};
use crate::util::Color;

pub const ALIVE_COLOR: Color = Color::rgb(255, 0, 0);
pub const BACKGROUND_COLOR: Color = Color::rgb(0, 0, 102);

/// Scale a generation onto a `width` x `height` pixel buffer, nearest cell.
/// Row 0 of the grid is drawn at the bottom, as the GPU renderer does.
pub fn display_generation(
    generation: &CellStateBuffer,
    buf: &mut [u32],
    width: usize,
    height: usize,
    alive: Color,
    background: Color,
) {
    let grid = generation.grid();
    let ratio_x = grid.width() as f32 / width as f32;
    let ratio_y = grid.height() as f32 / height as f32;
    for x in 0..width {
        for y in 0..height {
            let cell_x = ((x as f32 * ratio_x) as usize).min(grid.width() - 1);
            let cell_y = ((y as f32 * ratio_y) as usize).min(grid.height() - 1);
            let cell_y = grid.height() - 1 - cell_y;
            let color = if generation.read(cell_x as isize, cell_y as isize) {
                alive
            } else {
                background
            };
            buf[x + y * width] = color.as_u32();
        }
    }
}

/// One line per row, `#` alive and `.` dead, row 0 first.
pub fn ascii(generation: &CellStateBuffer) -> String {
    let grid = generation.grid();
    let mut out = String::with_capacity((grid.width() + 1) * grid.height());
    for row in generation.cells().chunks(grid.width()) {
        out.extend(row.iter().map(|&alive| if alive { '#' } else { '.' }));
        out.push('\n');
    }
    out
}

/// CPU render stage drawing into an owned pixel buffer.
pub struct PixelRenderer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
    alive: Color,
    background: Color,
    frames: u64,
}

impl PixelRenderer {
    pub fn new(width: usize, height: usize, alive: Color, background: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![background.as_u32(); width * height],
            alive,
            background,
            frames: 0,
        }
    }
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderStage<CellStateBuffer> for PixelRenderer {
    type Error = Infallible;

    fn render(&mut self, _id: BufferId, generation: &CellStateBuffer) -> Result<(), Infallible> {
        display_generation(
            generation,
            &mut self.pixels,
            self.width,
            self.height,
            self.alive,
            self.background,
        );
        self.frames += 1;
        Ok(())
    }
}

/// Render stage that presents nothing, for runs that only inspect
/// [`crate::sim::FrameDriver::latest`].
pub struct Discard;

impl<B> RenderStage<B> for Discard {
    type Error = Infallible;

    fn render(&mut self, _id: BufferId, _generation: &B) -> Result<(), Infallible> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FillPolicy, Grid};

    fn generation(cells: &[(usize, usize)]) -> CellStateBuffer {
        FillPolicy::Cells(cells.to_vec())
            .fill(Grid::new(2, 2).unwrap())
            .unwrap()
    }

    #[test]
    fn ascii_dump() {
        assert_eq!(ascii(&generation(&[(1, 0), (0, 1)])), ".#\n#.\n");
    }

    #[test]
    fn pixels_scale_and_flip_rows() {
        let white = Color::rgb(255, 255, 255);
        let black = Color::rgb(0, 0, 0);
        let mut renderer = PixelRenderer::new(4, 4, white, black);
        renderer
            .render(BufferId::A, &generation(&[(0, 0)]))
            .unwrap();
        let px = renderer.pixels();
        // cell (0, 0) covers the bottom-left 2x2 block
        for (x, y) in [(0, 2), (1, 2), (0, 3), (1, 3)] {
            assert_eq!(px[x + y * 4], white.as_u32());
        }
        assert_eq!(px[0], black.as_u32());
        assert_eq!(px[3 + 3 * 4], black.as_u32());
        assert_eq!(renderer.frames(), 1);
    }
}
