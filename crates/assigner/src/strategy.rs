//! Grouping and ordering strategies
//!
//! Four strategies decide the order devices are fed to the greedy placement
//! loop. Mobility portals evaluate only the ungrouped pair. Every ordering is
//! total (ties broken by id) so repeated runs visit devices identically.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rate_model::{CommPlanId, Device, PortalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Ungrouped, largest usage first
    UngroupedUsageDescending,
    /// Ungrouped, smallest usage first
    UngroupedUsageAscending,
    /// Grouped by comm plan, groups by aggregate usage descending
    GroupedUsageDescending,
    /// Grouped by comm plan, groups by aggregate usage ascending
    GroupedUsageAscending,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::UngroupedUsageDescending,
        Strategy::UngroupedUsageAscending,
        Strategy::GroupedUsageDescending,
        Strategy::GroupedUsageAscending,
    ];

    /// Strategies evaluated for a portal type.
    pub fn for_portal(portal: PortalType) -> &'static [Strategy] {
        const UNGROUPED_ONLY: [Strategy; 2] = [
            Strategy::UngroupedUsageDescending,
            Strategy::UngroupedUsageAscending,
        ];
        match portal {
            PortalType::Mobility => &UNGROUPED_ONLY,
            PortalType::M2M | PortalType::CrossProvider => &Self::ALL,
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// The order device indices are visited under this strategy.
    pub fn visit_order(&self, devices: &[Device]) -> Vec<usize> {
        match self {
            Strategy::UngroupedUsageDescending => ungrouped(devices, true),
            Strategy::UngroupedUsageAscending => ungrouped(devices, false),
            Strategy::GroupedUsageDescending => grouped(devices, true),
            Strategy::GroupedUsageAscending => grouped(devices, false),
        }
    }
}

fn ungrouped(devices: &[Device], descending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..devices.len()).collect();
    order.sort_by(|&a, &b| {
        let usage_cmp = if descending {
            devices[b].usage_for_period.cmp(&devices[a].usage_for_period)
        } else {
            devices[a].usage_for_period.cmp(&devices[b].usage_for_period)
        };
        usage_cmp.then(devices[a].device_id.cmp(&devices[b].device_id))
    });
    order
}

fn grouped(devices: &[Device], descending: bool) -> Vec<usize> {
    let mut groups: BTreeMap<CommPlanId, (Decimal, Vec<usize>)> = BTreeMap::new();
    for (i, device) in devices.iter().enumerate() {
        let entry = groups
            .entry(device.comm_plan_id)
            .or_insert((Decimal::ZERO, Vec::new()));
        entry.0 += device.usage_for_period;
        entry.1.push(i);
    }

    let mut ordered_groups: Vec<(CommPlanId, Decimal, Vec<usize>)> = groups
        .into_iter()
        .map(|(id, (total, members))| (id, total, members))
        .collect();
    ordered_groups.sort_by(|a, b| {
        let usage_cmp = if descending {
            b.1.cmp(&a.1)
        } else {
            a.1.cmp(&b.1)
        };
        usage_cmp.then(a.0.cmp(&b.0))
    });

    let mut order = Vec::with_capacity(devices.len());
    for (_, _, mut members) in ordered_groups {
        members.sort_by(|&a, &b| {
            let usage_cmp = if descending {
                devices[b].usage_for_period.cmp(&devices[a].usage_for_period)
            } else {
                devices[a].usage_for_period.cmp(&devices[b].usage_for_period)
            };
            usage_cmp.then(devices[a].device_id.cmp(&devices[b].device_id))
        });
        order.extend(members);
    }
    order
}
