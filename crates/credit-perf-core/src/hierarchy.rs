//! Facility / deal / fund comparison table with gross and net returns.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::CashflowRecord;
use crate::metrics::MetricsRow;
use crate::types::{Money, Multiple, Rate};

/// Rollup level, ranked finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Facility,
    Deal,
    Fund,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Facility => "Facility",
            Level::Deal => "Deal",
            Level::Fund => "Fund",
        };
        f.write_str(s)
    }
}

/// Display names for facility and deal identifiers, harvested from the ledger.
#[derive(Debug, Clone, Default)]
pub struct NameBook {
    facilities: BTreeMap<String, String>,
    deals: BTreeMap<String, String>,
}

impl NameBook {
    /// First non-empty name seen for each id wins.
    pub fn from_ledger(ledger: &[CashflowRecord]) -> Self {
        let mut book = Self::default();
        for row in ledger {
            if let (Some(id), Some(name)) = (&row.entity_id, &row.facility_name) {
                book.facilities.entry(id.clone()).or_insert_with(|| name.clone());
            }
            if let (Some(id), Some(name)) = (&row.deal_id, &row.deal_name) {
                book.deals.entry(id.clone()).or_insert_with(|| name.clone());
            }
        }
        book
    }

    pub fn name(&self, level: Level, id: &str) -> Option<String> {
        match level {
            Level::Facility => self.facilities.get(id).cloned(),
            Level::Deal => self.deals.get(id).cloned(),
            Level::Fund => Some(id.to_string()),
        }
    }
}

/// One row of the comparison table. Net figures exist only on fund rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyMetricsRow {
    pub level: Level,
    pub id: String,
    pub name: Option<String>,
    pub paid_in: Money,
    pub distributed: Money,
    pub gross_irr: Option<Rate>,
    pub gross_moic: Option<Multiple>,
    pub net_irr: Option<Rate>,
    pub net_moic: Option<Multiple>,
}

fn label(level: Level, rows: &[MetricsRow], names: &NameBook) -> Vec<HierarchyMetricsRow> {
    rows.iter()
        .filter_map(|row| {
            let id = row.entity()?;
            Some(HierarchyMetricsRow {
                level,
                id: id.to_string(),
                name: names.name(level, id),
                paid_in: row.paid_in,
                distributed: row.distributed,
                gross_irr: row.xirr,
                gross_moic: row.moic,
                net_irr: None,
                net_moic: None,
            })
        })
        .collect()
}

/// Stack the three levels in rank order: Facility, then Deal, then Fund.
pub fn rollup(
    facility: &[MetricsRow],
    deal: &[MetricsRow],
    fund: &[MetricsRow],
    names: &NameBook,
) -> Vec<HierarchyMetricsRow> {
    let mut out = label(Level::Facility, facility, names);
    out.extend(label(Level::Deal, deal, names));
    out.extend(label(Level::Fund, fund, names));
    out
}

/// Copy post-financing fund metrics onto the fund rows, matched by fund id.
/// Facility and deal rows keep empty net fields.
pub fn assign_net_metrics(
    rows: Vec<HierarchyMetricsRow>,
    fund_net: &[MetricsRow],
) -> Vec<HierarchyMetricsRow> {
    let mut net: BTreeMap<&str, &MetricsRow> = BTreeMap::new();
    for row in fund_net {
        if let Some(id) = row.entity() {
            net.entry(id).or_insert(row);
        }
    }

    rows.into_iter()
        .map(|mut row| {
            if row.level == Level::Fund {
                if let Some(n) = net.get(row.id.as_str()) {
                    row.net_irr = n.xirr;
                    row.net_moic = n.moic;
                }
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CashflowType;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn metrics(key: &[&str], irr: Rate, moic: Multiple) -> MetricsRow {
        MetricsRow {
            key: key.iter().map(|k| Some(k.to_string())).collect(),
            paid_in: dec!(100),
            distributed: dec!(100) * moic,
            moic: Some(moic),
            xirr: Some(irr),
        }
    }

    #[test]
    fn test_rollup_rank_order_and_net_only_on_fund() {
        let ledger = vec![CashflowRecord::facility(
            "f001",
            "d01",
            "fund_a",
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            CashflowType::Contribution,
            dec!(-100),
        )
        .with_names("Alpha Term Loan", "Alpha Holdings")];
        let names = NameBook::from_ledger(&ledger);

        let rows = rollup(
            &[metrics(&["f001", "d01", "fund_a"], dec!(0.12), dec!(1.3))],
            &[metrics(&["d01", "fund_a"], dec!(0.12), dec!(1.3))],
            &[metrics(&["fund_a"], dec!(0.12), dec!(1.3))],
            &names,
        );
        let rows = assign_net_metrics(rows, &[metrics(&["fund_a"], dec!(0.09), dec!(1.2))]);

        let levels: Vec<Level> = rows.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![Level::Facility, Level::Deal, Level::Fund]);
        assert_eq!(rows[0].name.as_deref(), Some("Alpha Term Loan"));
        assert_eq!(rows[1].name.as_deref(), Some("Alpha Holdings"));
        assert_eq!(rows[2].name.as_deref(), Some("fund_a"));
        assert_eq!(rows[0].net_irr, None);
        assert_eq!(rows[1].net_moic, None);
        assert_eq!(rows[2].gross_irr, Some(dec!(0.12)));
        assert_eq!(rows[2].net_irr, Some(dec!(0.09)));
        assert_eq!(rows[2].net_moic, Some(dec!(1.2)));
    }

    #[test]
    fn test_unmatched_fund_keeps_empty_net() {
        let rows = rollup(&[], &[], &[metrics(&["fund_b"], dec!(0.1), dec!(1.1))], &NameBook::default());
        let rows = assign_net_metrics(rows, &[metrics(&["fund_a"], dec!(0.09), dec!(1.2))]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].net_irr, None);
    }
}
