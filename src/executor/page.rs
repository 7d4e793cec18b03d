// src/executor/page.rs - Paper formats and the page-to-machine transform
use crate::config::PageConfig;

/// Machine position of the page's top-right corner when the sheet sits flush
/// against the back-right of the bed. A4 and A3 share it.
pub const REFERENCE_CORNER: (f64, f64) = (290.0, 0.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub name: &'static str,
    pub width_mm: f64,
    pub height_mm: f64,
}

pub const A4: PageFormat = PageFormat { name: "A4", width_mm: 210.0, height_mm: 297.0 };
pub const A3: PageFormat = PageFormat { name: "A3", width_mm: 297.0, height_mm: 420.0 };

impl PageFormat {
    pub fn from_name(name: &str) -> Option<PageFormat> {
        [A4, A3].into_iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn apply(&self, page: &mut PageConfig) {
        page.width_mm = self.width_mm;
        page.height_mm = self.height_mm;
    }
}

/// Reference corner for `page`, honouring configured overrides.
pub fn reference_corner(page: &PageConfig) -> (f64, f64) {
    (
        page.reference_x.unwrap_or(REFERENCE_CORNER.0),
        page.reference_y.unwrap_or(REFERENCE_CORNER.1),
    )
}

/// Maps page coordinates (origin top-left, +y down) onto machine coordinates
/// (+x right, -y towards the front). The origin is the machine position of
/// the page's top-right corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub page_width: f64,
}

impl CoordinateTransform {
    pub fn new(origin_x: f64, origin_y: f64, page_width: f64) -> Self {
        Self { origin_x, origin_y, page_width }
    }

    pub fn apply(&self, page_x: f64, page_y: f64) -> (f64, f64) {
        (self.origin_x + (page_x - self.page_width), self.origin_y - page_y)
    }
}
