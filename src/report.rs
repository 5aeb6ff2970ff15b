use std::io::Write;

use crate::models::{PurchaseAttempt, PurchaseStats};
use crate::Result;

/// Write attempts as CSV, one row per attempt
pub fn write_csv<W: Write>(attempts: &[PurchaseAttempt], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record([
        "timestamp",
        "requested_amount",
        "filled_quantity",
        "fill_price",
        "status",
        "order_id",
        "failure_reason",
    ])?;

    for a in attempts {
        wtr.write_record([
            a.timestamp.to_rfc3339().as_str(),
            format!("{:.2}", a.requested_amount).as_str(),
            format!("{:.8}", a.filled_quantity).as_str(),
            format!("{:.2}", a.fill_price).as_str(),
            a.status.as_str(),
            a.order_id.as_deref().unwrap_or_default(),
            a.failure_reason.as_deref().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Single human-readable history line
pub fn history_line(attempt: &PurchaseAttempt) -> String {
    let when = attempt.timestamp.format("%Y-%m-%d %H:%M:%S");
    if attempt.is_success() {
        format!(
            "✅ {}  ${:.2} -> {:.8} @ ${:.2}  order {}",
            when,
            attempt.requested_amount,
            attempt.filled_quantity,
            attempt.fill_price,
            attempt.order_id.as_deref().unwrap_or("-")
        )
    } else {
        format!(
            "❌ {}  ${:.2}  {}",
            when,
            attempt.requested_amount,
            attempt.failure_reason.as_deref().unwrap_or("unknown error")
        )
    }
}

pub fn stats_summary(stats: &PurchaseStats) -> String {
    format!(
        "Attempts: {} ({} ok, {} failed, {:.1}% success)\nSpent: ${:.2}\nAccumulated: {:.8}\nAverage price: ${:.2}",
        stats.total_attempts,
        stats.successful,
        stats.failed,
        stats.success_rate,
        stats.total_spent,
        stats.total_quantity,
        stats.avg_price
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderFill;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_csv_export() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let attempts = vec![
            PurchaseAttempt::succeeded(
                ts,
                15.0,
                &OrderFill {
                    order_id: "991".to_string(),
                    filled_quantity: 0.0005,
                    avg_price: 30000.0,
                },
            ),
            PurchaseAttempt::failed(ts, 20.0, "Order rejected (-2010): Account has insufficient balance, try again"),
        ];

        let mut out = Vec::new();
        write_csv(&attempts, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "timestamp,requested_amount,filled_quantity,fill_price,status,order_id,failure_reason"
        );
        assert_eq!(
            lines[1],
            "2024-03-01T12:00:00+00:00,15.00,0.00050000,30000.00,success,991,"
        );
        // Comma in the reason gets quoted
        assert!(lines[2].ends_with("\"Order rejected (-2010): Account has insufficient balance, try again\""));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_history_line() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let line = history_line(&PurchaseAttempt::failed(ts, 20.0, "insufficient balance"));
        assert!(line.contains("insufficient balance"));
        assert!(line.contains("$20.00"));
    }
}
