use crate::ledger::{BuyInSummary, DistributionRow, Holder};
use crate::query::commands::HolderDetail;
use crate::repository::TransferStats;
use crate::valuation::{share_percent, to_token_units};
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_holders(
    holders: &[Holder],
    total_supply: U256,
    decimals: Option<u8>,
    format: &OutputFormat,
) -> String {
    let decimals = decimals.unwrap_or(18);
    match format {
        OutputFormat::Table => format_holders_table(holders, total_supply, decimals),
        OutputFormat::Json => format_holders_json(holders, total_supply, decimals),
        OutputFormat::Csv => format_holders_csv(holders, total_supply, decimals),
    }
}

fn holder_share(holder: &Holder, total_supply: U256, decimals: u8) -> f64 {
    share_percent(
        to_token_units(holder.balance, decimals),
        to_token_units(total_supply, decimals),
    )
}

fn format_holders_table(holders: &[Holder], total_supply: U256, decimals: u8) -> String {
    if holders.is_empty() {
        return "No holders found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Rank",
            "Address",
            "Balance",
            "Share",
            "Acquired",
            "Acquired Amount",
        ]);

    for (i, holder) in holders.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(format!("{:#}", holder.address)),
            Cell::new(format_amount(holder.balance, decimals)),
            Cell::new(format!("{:.4}%", holder_share(holder, total_supply, decimals))),
            Cell::new(acquired_on(holder)),
            Cell::new(
                holder
                    .acquisition_amount()
                    .map_or("-".to_string(), |a| format_amount(a, decimals)),
            ),
        ]);
    }

    table.to_string()
}

fn format_holders_json(holders: &[Holder], total_supply: U256, decimals: u8) -> String {
    let json_holders: Vec<_> = holders
        .iter()
        .enumerate()
        .map(|(i, holder)| {
            json!({
                "rank": i + 1,
                "address": format!("{:?}", holder.address),
                "balance": format_amount(holder.balance, decimals),
                "balance_wei": holder.balance.to_string(),
                "share_percent": holder_share(holder, total_supply, decimals),
                "acquisition_timestamp": holder.acquisition_timestamp(),
                "acquisition_amount": holder.acquisition_amount().map(|a| a.to_string()),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_holders).unwrap_or_else(|_| "[]".to_string())
}

fn format_holders_csv(holders: &[Holder], total_supply: U256, decimals: u8) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "rank",
        "address",
        "balance",
        "balance_wei",
        "share_percent",
        "acquisition_timestamp",
        "acquisition_amount_wei",
    ]);

    for (i, holder) in holders.iter().enumerate() {
        let _ = wtr.write_record([
            &(i + 1).to_string(),
            &format!("{:?}", holder.address),
            &format_amount(holder.balance, decimals),
            &holder.balance.to_string(),
            &holder_share(holder, total_supply, decimals).to_string(),
            &holder
                .acquisition_timestamp()
                .map_or(String::new(), |t| t.to_string()),
            &holder
                .acquisition_amount()
                .map_or(String::new(), |a| a.to_string()),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_holder_detail(detail: &HolderDetail, decimals: Option<u8>, format: &OutputFormat) -> String {
    let decimals = decimals.unwrap_or(18);
    let rows = holder_detail_rows(detail, decimals);

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);
            for (label, _, value) in &rows {
                table.add_row(vec![Cell::new(label), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "address": format!("{:?}", detail.address),
            "balance": format_amount(detail.balance, decimals),
            "balance_wei": detail.balance.to_string(),
            "share_percent": detail.share_percent,
            "acquisition_timestamp": detail.acquisition.map(|r| r.timestamp),
            "acquisition_amount": detail.acquisition.map(|r| r.amount.to_string()),
            "buy_in_eth": detail.buy_in_eth,
            "buy_in_usd": detail.buy_in_usd,
            "current_value_usd": detail.current_value,
            "change_percent": detail.change_percent,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for (_, key, value) in &rows {
                let _ = wtr.write_record([*key, value.as_str()]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn holder_detail_rows(detail: &HolderDetail, decimals: u8) -> Vec<(&'static str, &'static str, String)> {
    let mut rows = vec![
        ("Address", "address", format!("{:?}", detail.address)),
        ("Balance", "balance", format_amount(detail.balance, decimals)),
        ("Share", "share_percent", format!("{:.4}%", detail.share_percent)),
    ];

    match detail.acquisition {
        Some(record) => {
            let date = record
                .date()
                .map_or(record.timestamp.to_string(), |d| d.to_string());
            rows.push(("Acquired", "acquired", date));
            rows.push(("Acquired Amount", "acquired_amount", format_amount(record.amount, decimals)));
        }
        None => rows.push(("Acquired", "acquired", "mint only".to_string())),
    }

    if let (Some(eth), Some(usd)) = (detail.buy_in_eth, detail.buy_in_usd) {
        rows.push(("Buy-in (ETH)", "buy_in_eth", format!("{eth:.4}")));
        rows.push(("Buy-in (USD)", "buy_in_usd", format!("{usd:.2}")));
    }
    if let Some(value) = detail.current_value {
        rows.push(("Current Value (USD)", "current_value_usd", format!("{value:.2}")));
    }
    if let Some(change) = detail.change_percent {
        rows.push(("Change", "change_percent", format!("{change:+.2}%")));
    }

    rows
}

pub fn format_distribution(rows: &[DistributionRow], decimals: Option<u8>, format: &OutputFormat) -> String {
    let decimals = decimals.unwrap_or(18);
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No buy-in records found.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Date", "Holders", "Total Balance"]);
            for row in rows {
                table.add_row(vec![
                    Cell::new(row.date),
                    Cell::new(row.holder_count),
                    Cell::new(format_amount(row.total, decimals)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_rows: Vec<_> = rows
                .iter()
                .map(|row| {
                    json!({
                        "date": row.date.to_string(),
                        "holder_count": row.holder_count,
                        "total": format_amount(row.total, decimals),
                        "total_wei": row.total.to_string(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["date", "holder_count", "total", "total_wei"]);
            for row in rows {
                let _ = wtr.write_record([
                    &row.date.to_string(),
                    &row.holder_count.to_string(),
                    &format_amount(row.total, decimals),
                    &row.total.to_string(),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_summary(summary: &BuyInSummary, negative_balances: usize, format: &OutputFormat) -> String {
    let date_or_na = |d: Option<chrono::NaiveDate>| d.map_or("N/A".to_string(), |d| d.to_string());
    let rows = [
        ("Buy-in Holders", "buy_in_holders", summary.buy_in_holders.to_string()),
        ("Mint-only Holders", "mint_only_holders", summary.mint_only_holders.to_string()),
        ("Earliest Buy-in", "earliest", date_or_na(summary.earliest)),
        ("Latest Buy-in", "latest", date_or_na(summary.latest)),
        ("Negative Balances", "negative_balances", negative_balances.to_string()),
    ];

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);
            for (label, _, value) in &rows {
                table.add_row(vec![Cell::new(label), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "buy_in_holders": summary.buy_in_holders,
            "mint_only_holders": summary.mint_only_holders,
            "earliest": summary.earliest.map(|d| d.to_string()),
            "latest": summary.latest.map(|d| d.to_string()),
            "negative_balances": negative_balances,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for (_, key, value) in &rows {
                let _ = wtr.write_record([*key, value.as_str()]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &TransferStats, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![
                Cell::new("Total Transfers"),
                Cell::new(stats.total_transfers),
            ]);
            table.add_row(vec![
                Cell::new("Unique Addresses"),
                Cell::new(stats.unique_addresses),
            ]);
            table.add_row(vec![
                Cell::new("Earliest Block"),
                Cell::new(block_or_na(stats.earliest_block)),
            ]);
            table.add_row(vec![
                Cell::new("Latest Block"),
                Cell::new(block_or_na(stats.latest_block)),
            ]);

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "total_transfers": stats.total_transfers,
            "unique_addresses": stats.unique_addresses,
            "earliest_block": stats.earliest_block,
            "latest_block": stats.latest_block,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["total_transfers", &stats.total_transfers.to_string()]);
            let _ = wtr.write_record(["unique_addresses", &stats.unique_addresses.to_string()]);
            let _ = wtr.write_record(["earliest_block", &block_or_na(stats.earliest_block)]);
            let _ = wtr.write_record(["latest_block", &block_or_na(stats.latest_block)]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn block_or_na(block: Option<u64>) -> String {
    block.map_or("N/A".to_string(), |b| b.to_string())
}

fn acquired_on(holder: &Holder) -> String {
    match holder.acquisition {
        Some(record) => record
            .date()
            .map_or(record.timestamp.to_string(), |d| d.to_string()),
        None => "mint".to_string(),
    }
}

fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AcquisitionRecord;
    use alloy_primitives::Address;
    use chrono::NaiveDate;

    fn holders() -> Vec<Holder> {
        vec![
            Holder {
                address: Address::repeat_byte(0xa),
                balance: U256::from(500u64),
                acquisition: None,
            },
            Holder {
                address: Address::repeat_byte(0xb),
                balance: U256::from(400u64),
                acquisition: Some(AcquisitionRecord {
                    address: Address::repeat_byte(0xb),
                    timestamp: 1_623_484_800,
                    amount: U256::from(400u64),
                }),
            },
        ]
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!(OutputFormat::from("JSON"), OutputFormat::Json));
        assert!(matches!(OutputFormat::from("csv"), OutputFormat::Csv));
        assert!(matches!(OutputFormat::from("anything"), OutputFormat::Table));
    }

    #[test]
    fn test_holders_json() {
        let output = format_holders(&holders(), U256::from(1000u64), Some(0), &OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed[0]["rank"], 1);
        assert_eq!(parsed[0]["share_percent"], 50.0);
        assert!(parsed[0]["acquisition_timestamp"].is_null());
        assert_eq!(parsed[1]["acquisition_timestamp"], 1_623_484_800u64);
        assert_eq!(parsed[1]["acquisition_amount"], "400");
    }

    #[test]
    fn test_holders_csv_leaves_mint_only_acquisition_blank() {
        let output = format_holders(&holders(), U256::from(1000u64), Some(0), &OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("rank,address,balance"));
        assert!(lines[1].ends_with(",,"));
        assert!(lines[2].ends_with(",1623484800,400"));
    }

    #[test]
    fn test_empty_holders_table() {
        let output = format_holders(&[], U256::ZERO, None, &OutputFormat::Table);
        assert_eq!(output, "No holders found.");
    }

    #[test]
    fn test_distribution_csv() {
        let rows = vec![DistributionRow {
            date: NaiveDate::from_ymd_opt(2021, 6, 12).unwrap(),
            holder_count: 2,
            total: U256::from(350u64),
        }];
        let output = format_distribution(&rows, Some(0), &OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "date,holder_count,total,total_wei");
        assert!(lines[1].starts_with("2021-06-12,2,"));
        assert!(lines[1].ends_with(",350"));
    }

    #[test]
    fn test_summary_json() {
        let summary = BuyInSummary {
            earliest: NaiveDate::from_ymd_opt(2021, 6, 12),
            latest: None,
            buy_in_holders: 3,
            mint_only_holders: 1,
        };
        let output = format_summary(&summary, 2, &OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["earliest"], "2021-06-12");
        assert!(parsed["latest"].is_null());
        assert_eq!(parsed["negative_balances"], 2);
    }
}
