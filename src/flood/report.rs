//! Human-readable run summary.

use std::time::Duration;

use super::Summary;

/// Format a summary as the block printed at the end of a run.
pub fn format_summary(summary: &Summary) -> String {
    let mut out = String::from("---------- SUMMARY ----------\n");

    out.push_str(&format!("{} frames sent\n", summary.frames_sent));
    if summary.frames_failed > 0 {
        out.push_str(&format!("{} frames failed\n", summary.frames_failed));
    }
    out.push_str(&format!("{} bytes written\n", summary.bytes_written));
    out.push_str(&format!(
        "Took a total time of {} ({} worker{})\n",
        format_duration(summary.elapsed),
        summary.workers,
        if summary.workers == 1 { "" } else { "s" },
    ));
    out.push_str(&format!(
        "Rate: {:.0} frames/s, {}\n",
        summary.frames_per_sec(),
        format_rate(summary.throughput_mbps()),
    ));

    if summary.interrupted {
        out.push_str(&format!(
            "Interrupted after issuing {} of {} frames\n",
            summary.frames_issued, summary.frames_requested
        ));
    }

    out
}

fn format_rate(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3}s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3}ms", secs * 1e3)
    } else {
        format!("{}µs", d.as_micros())
    }
}
