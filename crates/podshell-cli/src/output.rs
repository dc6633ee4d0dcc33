//! Table output for pods.

use std::io::{self, Write};

use podshell::Pod;

/// Column headers of the pod table.
pub const HEADERS: [&str; 7] = ["ID", "POOL ID", "NAME", "STATUS", "GPU", "GPU MODEL", "MEMORY"];

/// Spaces between columns.
const PADDING: usize = 2;

/// ANSI sequence that homes the cursor and clears the screen.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

const KB: i64 = 1 << 10;
const MB: i64 = 1 << 20;
const GB: i64 = 1 << 30;

/// Format a byte count with binary units, e.g. `64.00 GB`.
///
/// Sizes below one kilobyte are printed as whole bytes.
#[must_use]
pub fn human_memory(bytes: i64) -> String {
    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

fn row(pod: &Pod) -> [String; 7] {
    [
        pod.id.clone(),
        pod.pool_id.clone(),
        pod.name.clone(),
        pod.provider_status.clone(),
        pod.gpu_count.to_string(),
        pod.gpu_model.to_string(),
        human_memory(pod.memory_size),
    ]
}

/// Write `pods` as an aligned table with a header row.
pub fn write_pods<W: Write>(out: &mut W, pods: &[Pod]) -> io::Result<()> {
    let rows: Vec<[String; 7]> = pods.iter().map(row).collect();

    let mut widths = HEADERS.map(str::len);
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    write_row(out, &widths, HEADERS.iter().copied())?;
    for cells in &rows {
        write_row(out, &widths, cells.iter().map(String::as_str))?;
    }
    out.flush()
}

fn write_row<'a, W: Write>(out: &mut W, widths: &[usize; 7], cells: impl Iterator<Item = &'a str>) -> io::Result<()> {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i + 1 == widths.len() {
            line.push_str(cell);
        } else {
            let pad = widths[i] + PADDING - cell.chars().count();
            line.push_str(cell);
            line.extend(std::iter::repeat_n(' ', pad));
        }
    }
    writeln!(out, "{}", line.trim_end())
}
