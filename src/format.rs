/// How a byte total is rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeStyle {
    /// `"<N> bytes"`, exact.
    #[default]
    Bytes,
    /// Binary units with one decimal, e.g. `"1.5 MB"`.
    Human,
}

impl SizeStyle {
    pub fn render(self, size: u64) -> String {
        match self {
            SizeStyle::Bytes => format_bytes(size),
            SizeStyle::Human => format_size(size),
        }
    }
}

pub fn format_bytes(size: u64) -> String {
    format!("{} bytes", size)
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{} B", size);
    }
    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", value, UNITS[unit_index])
}
