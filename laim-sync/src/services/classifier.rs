//! Item type inference from vendor/model text
//!
//! Rules are ordered `(pattern, type)` pairs matched case-insensitively as
//! substrings of `"{model} {vendor}"`. The first matching rule wins; no match
//! yields [`ItemType::Other`]. The table comes from configuration, falling
//! back to [`default_rules`].

use crate::models::{DeviceRecord, ItemType};

/// One classification rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRule {
    /// Lowercase substring
    pub pattern: String,
    pub item_type: ItemType,
}

impl ClassifierRule {
    pub fn new(pattern: &str, item_type: ItemType) -> Self {
        Self {
            pattern: pattern.trim().to_lowercase(),
            item_type,
        }
    }
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassifierRule>,
}

impl Classifier {
    /// Blank patterns are dropped; they would match everything
    pub fn new(rules: Vec<ClassifierRule>) -> Self {
        Self {
            rules: rules.into_iter().filter(|r| !r.pattern.is_empty()).collect(),
        }
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    /// Classify free text
    pub fn classify_text(&self, vendor: Option<&str>, model: Option<&str>) -> ItemType {
        let text = [model, vendor]
            .iter()
            .flatten()
            .map(|s| s.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return ItemType::Other;
        }

        self.rules
            .iter()
            .find(|rule| text.contains(&rule.pattern))
            .map(|rule| rule.item_type)
            .unwrap_or(ItemType::Other)
    }

    pub fn classify(&self, record: &DeviceRecord) -> ItemType {
        self.classify_text(record.vendor.as_deref(), record.model.as_deref())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Built-in table: Firewall, Switch, WAP, Server, Desktop, Laptop, Smart TV
pub fn default_rules() -> Vec<ClassifierRule> {
    const TABLE: &[(ItemType, &[&str])] = &[
        (
            ItemType::Firewall,
            &[
                "firewall", "router", "isr", "asr", "edgerouter", "routeros", "vyos", "pfsense",
                "opnsense", "fortigate", "srx", "udm", "usg", "dream machine", "security gateway",
                "sonicwall", "asa", "fortinet", "sophos", "watchguard", "netgate", "pa-",
                "palo alto",
            ],
        ),
        (
            ItemType::Switch,
            &[
                "switch", "catalyst", "nexus", "arista", "powerswitch", "procurve", "comware",
                "edgeswitch", "usw-", "usw ", "meraki ms", "brocade", "icx", "s4048", "s5048",
                "z9100", "us-8", "us-16", "us-24", "us-48", "usl-", "cisco sg", "sg300", "sg500",
                "ws-c", "c9300", "c9200", "c3850", "c3750", "c2960",
            ],
        ),
        (
            ItemType::Wap,
            &[
                "wap", "wireless", "wifi", "access point", "aruba ap", "unifi ap", "uap-", "uap ",
                "iap-", "aironet", "meraki mr", "u6-", "u6 ", "u7-", "u7 ", "u-xg", "unifi 6",
                "unifi 7", "nanostation", "litebeam", "powerbeam", "nanobeam", "ac-pro", "ac-lite",
                "ac-lr", "ac-hd", "ac-shd", "flexhd", "nanohd",
            ],
        ),
        (
            ItemType::Server,
            &[
                "server", "poweredge", "proliant", "blade", "esxi", "vmware", "vcenter", "dell r",
                "hp dl", "supermicro", "rackmount", "hypervisor", "proxmox", "xenserver",
                "hyper-v",
            ],
        ),
        (
            ItemType::Desktop,
            &[
                "optiplex", "prodesk", "thinkcentre", "desktop", "workstation", "precision",
                "elitedesk", "compaq", "imac", "mac mini",
            ],
        ),
        (
            ItemType::Laptop,
            &[
                "latitude", "elitebook", "thinkpad", "laptop", "notebook", "macbook", "probook",
                "zbook", "inspiron", "xps", "surface", "chromebook", "pavilion",
            ],
        ),
        (
            ItemType::SmartTv,
            &[
                "smart tv", "samsung tv", "lg tv", "sony tv", "smart display", "signage", "roku",
                "fire tv", "chromecast", "apple tv", "shield",
            ],
        ),
    ];

    TABLE
        .iter()
        .flat_map(|(item_type, patterns)| {
            patterns
                .iter()
                .map(move |pattern| ClassifierRule::new(pattern, *item_type))
        })
        .collect()
}
