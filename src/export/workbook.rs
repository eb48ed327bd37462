use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, ColNum, Format, FormatAlign, RowNum, Workbook, Worksheet, XlsxError};

use crate::report::WalletReport;

use super::format::{format_native, format_timestamp, format_usd, format_usd_opt, short_address};

const ACCENT: u32 = 0x6C5CE7;
const DARK: u32 = 0x1A1A2E;
const MAX_COLUMN_WIDTH: usize = 45;

const BREAKDOWN_HEADER: &[&str] = &[
    "Chain",
    "Symbol",
    "Transactions",
    "Received (USD)",
    "Sent (USD)",
    "Fees (USD)",
    "Balance (USD)",
    "Token Transfers",
    "Counterparties",
    "First Activity",
    "Last Activity",
];

const HOLDINGS_HEADER: &[&str] = &["Chain", "Token", "Name", "Balance", "Value (USD)", "Contract"];

/// Worksheet plus the widest value seen per column, for sizing.
struct Sheet {
    inner: Worksheet,
    widths: Vec<usize>,
}

impl Sheet {
    fn new(name: &str) -> Result<Self, XlsxError> {
        let mut inner = Worksheet::new();
        inner.set_name(name)?;
        Ok(Self {
            inner,
            widths: Vec::new(),
        })
    }

    fn track(&mut self, col: ColNum, len: usize) {
        let col = usize::from(col);
        if self.widths.len() <= col {
            self.widths.resize(col + 1, 0);
        }
        self.widths[col] = self.widths[col].max(len);
    }

    fn text(&mut self, row: RowNum, col: ColNum, value: &str, format: Option<&Format>) -> Result<(), XlsxError> {
        self.track(col, value.chars().count());
        match format {
            Some(format) => self.inner.write_string_with_format(row, col, value, format)?,
            None => self.inner.write_string(row, col, value)?,
        };
        Ok(())
    }

    fn number(&mut self, row: RowNum, col: ColNum, value: u64) -> Result<(), XlsxError> {
        self.track(col, value.to_string().len());
        self.inner.write_number(row, col, value as f64)?;
        Ok(())
    }

    fn header(&mut self, labels: &[&str], format: &Format) -> Result<(), XlsxError> {
        for (col, label) in labels.iter().enumerate() {
            self.text(0, col as ColNum, label, Some(format))?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Worksheet, XlsxError> {
        for (col, width) in self.widths.iter().enumerate() {
            let width = (width + 3).min(MAX_COLUMN_WIDTH);
            self.inner.set_column_width(col as ColNum, width as f64)?;
        }
        Ok(self.inner)
    }
}

/// Render a report as an .xlsx workbook: a Summary sheet, the chain
/// breakdown in report order, and token holdings when there are any.
pub fn to_xlsx(report: &WalletReport, generated_at: DateTime<Utc>) -> eyre::Result<Vec<u8>> {
    build(report, generated_at).map_err(|e| eyre::eyre!("Failed to build workbook: {}", e))
}

fn build(report: &WalletReport, generated_at: DateTime<Utc>) -> Result<Vec<u8>, XlsxError> {
    let bold = Format::new().set_bold();
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(DARK));
    let title = Format::new()
        .set_bold()
        .set_font_size(16)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(ACCENT))
        .set_align(FormatAlign::Center);

    let mut workbook = Workbook::new();

    let mut summary = Sheet::new("Summary")?;
    summary
        .inner
        .merge_range(0, 0, 0, 4, "Web3 Wallet Analysis Report", &title)?;
    let rows = [
        ("Address", report.address.clone()),
        ("Type", report.address_type.as_str().to_uppercase()),
        ("Generated", format_timestamp(Some(generated_at))),
        ("Total Transactions", report.total_tx_count.to_string()),
        ("Total Received (USD)", format_usd(report.total_received_usd)),
        ("Total Sent (USD)", format_usd(report.total_sent_usd)),
        ("Net Flow (USD)", format_usd(report.net_flow_usd)),
        ("Total Fees (USD)", format_usd(report.total_fees_usd)),
        ("Current Balance (USD)", format_usd(report.total_current_balance_usd)),
        ("Active Chains", report.chains_with_activity.len().to_string()),
        (
            "Wallet Age (Days)",
            report
                .wallet_age_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        ),
        ("First Activity", format_timestamp(report.first_activity)),
        ("Last Activity", format_timestamp(report.last_activity)),
    ];
    for (i, (label, value)) in rows.iter().enumerate() {
        let row = i as RowNum + 2;
        summary.text(row, 0, label, Some(&bold))?;
        summary.text(row, 1, value, None)?;
    }
    workbook.push_worksheet(summary.finish()?);

    let mut breakdown = Sheet::new("Chain Breakdown")?;
    breakdown.header(BREAKDOWN_HEADER, &header)?;
    for (i, s) in report.chain_summaries.iter().enumerate() {
        let row = i as RowNum + 1;
        breakdown.text(row, 0, &s.chain_name, None)?;
        breakdown.text(row, 1, &s.native_symbol, None)?;
        breakdown.number(row, 2, s.tx_count)?;
        breakdown.text(row, 3, &format_usd_opt(s.total_received_usd), None)?;
        breakdown.text(row, 4, &format_usd_opt(s.total_sent_usd), None)?;
        breakdown.text(row, 5, &format_usd_opt(s.total_fees_usd), None)?;
        breakdown.text(row, 6, &format_usd_opt(s.current_balance_usd()), None)?;
        breakdown.number(row, 7, s.token_transfer_count)?;
        breakdown.number(row, 8, s.unique_counterparties as u64)?;
        breakdown.text(row, 9, &format_timestamp(s.first_activity), None)?;
        breakdown.text(row, 10, &format_timestamp(s.last_activity), None)?;
    }
    workbook.push_worksheet(breakdown.finish()?);

    if !report.all_token_holdings.is_empty() {
        let mut holdings = Sheet::new("Token Holdings")?;
        holdings.header(HOLDINGS_HEADER, &header)?;
        for (i, token) in report.all_token_holdings.iter().enumerate() {
            let row = i as RowNum + 1;
            holdings.text(row, 0, &token.chain, None)?;
            holdings.text(row, 1, &token.symbol, None)?;
            holdings.text(row, 2, &token.name, None)?;
            holdings.text(row, 3, &format_native(&token.balance), None)?;
            holdings.text(row, 4, &format_usd_opt(token.balance_usd), None)?;
            holdings.text(row, 5, &short_address(&token.contract_address, 6), None)?;
        }
        workbook.push_worksheet(holdings.finish()?);
    }

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFamily;
    use crate::chains::descriptor;
    use crate::prices::PriceQuote;
    use crate::providers::RawActivity;
    use crate::report::aggregate;
    use std::collections::BTreeMap;

    #[test]
    fn workbook_is_a_zip_archive() {
        let chains = vec![descriptor("solana").unwrap()];
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "solana".to_string(),
            Ok(RawActivity {
                reported_tx_count: Some(12),
                ..RawActivity::default()
            }),
        );
        let report = aggregate("So1", AddressFamily::Solana, &chains, &outcomes, &PriceQuote::new(), Utc::now());

        let bytes = to_xlsx(&report, Utc::now()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn column_widths_are_capped() {
        let mut sheet = Sheet::new("Widths").unwrap();
        sheet.text(0, 0, "short", None).unwrap();
        sheet.text(1, 2, &"x".repeat(80), None).unwrap();
        sheet.number(2, 0, 1_234_567_890).unwrap();
        assert_eq!(sheet.widths, vec![10, 0, 80]);
        assert!(sheet.finish().is_ok());
    }
}
