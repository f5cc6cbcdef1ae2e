//! Digest aggregator — time-windowed relay activity grouped by
//! counterpart.

use crate::store::RelayLogRecord;

/// Per-counterpart digest counters.
#[derive(Debug, Default, Clone, Copy)]
struct DigestStats {
    count: usize,
    urgent: usize,
    auto_responded: usize,
}

/// Render a digest of the given records (already filtered to the
/// window, oldest first). Groups by the non-primary side of each record
/// in first-seen order; counterparts are not re-sorted by volume.
pub fn build_digest(records: &[RelayLogRecord], hours_back: i64, primary_user: &str) -> String {
    let header = format!("📊 Message Digest (last {hours_back} hours):");

    if records.is_empty() {
        return format!("{header}\nNo messages during this period.");
    }

    let mut groups: Vec<(String, DigestStats)> = Vec::new();
    for record in records {
        let counterpart = if record.from_user == primary_user {
            &record.to_user
        } else {
            &record.from_user
        };

        let idx = match groups.iter().position(|(name, _)| name == counterpart) {
            Some(idx) => idx,
            None => {
                groups.push((counterpart.clone(), DigestStats::default()));
                groups.len() - 1
            }
        };

        let stats = &mut groups[idx].1;
        stats.count += 1;
        if record.is_urgent {
            stats.urgent += 1;
        }
        if record.was_auto_responded {
            stats.auto_responded += 1;
        }
    }

    let mut digest = format!("{header}\nTotal: {} messages\n", records.len());
    for (counterpart, stats) in &groups {
        digest.push('\n');
        digest.push_str(&format!(
            "• {}: {} message{}",
            counterpart,
            stats.count,
            if stats.count > 1 { "s" } else { "" }
        ));
        if stats.urgent > 0 {
            digest.push_str(&format!(" ({} urgent)", stats.urgent));
        }
        if stats.auto_responded > 0 {
            digest.push_str(&format!(" ({} auto-responded)", stats.auto_responded));
        }
    }

    digest
}
