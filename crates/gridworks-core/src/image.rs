use crate::geometry::Color;

/// Side length in pixels of the image a cell draws into.
pub const CELL_IMAGE_SIZE: u32 = 16;

/// A small RGBA raster produced by a part's draw hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new(CELL_IMAGE_SIZE, CELL_IMAGE_SIZE)
    }
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::TRANSPARENT; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    /// Writes outside the raster are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = color;
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        (x < self.width && y < self.height).then(|| self.pixels[(y * self.width + x) as usize])
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| *p == Color::TRANSPARENT)
    }
}
