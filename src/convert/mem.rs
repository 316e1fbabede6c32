//! Best-effort resident memory sampling for conversion accounting.

/// Resident set size of this process, if the platform exposes it cheaply.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes() -> Option<i64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: i64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * page_size())
}

#[cfg(target_os = "linux")]
fn page_size() -> i64 {
    // statm reports pages; 4 KiB covers every platform we deploy to.
    4096
}

#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes() -> Option<i64> {
    None
}
