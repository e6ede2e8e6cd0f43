//! Human-readable progress messages.
//!
//! Pure functions so the wording can be checked without building events.
//! The text is for observers only; nothing in the transfer reads it back.

/// Message for a download request.
pub fn getting_changes_request(batch_index_requested: u32, batch_count: u32) -> String {
    if batch_count <= 1 {
        "Getting All Changes".to_string()
    } else {
        format!(
            "Getting Batch Changes. ({}/{}).",
            u64::from(batch_index_requested) + 1,
            batch_count
        )
    }
}

/// Message for a received download batch.
pub fn getting_changes_response(
    batch_index: u32,
    batch_count: u32,
    rows: usize,
    total_rows: u64,
) -> String {
    if batch_count == 0 && batch_index == 0 {
        format!("Downloaded All Changes. Rows:{rows}. Total Rows: {total_rows}.")
    } else {
        format!(
            "Downloaded Batch Changes. ({}/{}). Rows:{}. Total Rows: {}.",
            u64::from(batch_index) + 1,
            batch_count,
            rows,
            total_rows
        )
    }
}

/// Message for an upload batch about to be sent.
pub fn sending_changes_request(
    batch_index: u32,
    batch_count: u32,
    rows: usize,
    total_rows: usize,
) -> String {
    if batch_count == 0 && batch_index == 0 {
        format!("Sending All Changes. Rows:{rows}. Waiting Server Response...")
    } else {
        format!(
            "Sending Batch Changes. Batches: ({}/{}). Rows: ({}/{}). Waiting Server Response...",
            u64::from(batch_index) + 1,
            batch_count,
            rows,
            total_rows
        )
    }
}
