//! 点菜摘要 - 从带 `#order` 标签的 memo 中提取精简文本
//!
//! 逐行扫描，菜品行支持两种写法（先匹配结构化写法，再匹配自由写法）：
//! 1) `- name:"菜名" qty:1 price:25`
//! 2) `- 菜名 × 1 × ¥25` 或 `- 菜名 × 1`（分隔符可为 `×` `x` `X` `*`）
//!
//! 两种都不匹配的行直接跳过，不报错。

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

const ORDER_TAG: &str = "#order";

/// 菜品
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub qty: u32,
    /// 单价
    pub price: Option<f64>,
}

/// 摘要样式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStyle {
    /// 推送用：菜单头 + 最多 10 条
    Compact,
    /// 点菜人/时间头 + 最多 20 条
    Detailed,
}

impl SummaryStyle {
    fn item_limit(&self) -> usize {
        match self {
            Self::Compact => 10,
            Self::Detailed => 20,
        }
    }
}

/// 解析出的点菜单
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSummary {
    pub menu_id: Option<String>,
    pub customer: Option<String>,
    pub ordered_at: Option<String>,
    items: Vec<OrderItem>,
}

struct Patterns {
    menu: Regex,
    customer: Regex,
    time: Regex,
    structured: Regex,
    loose: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        menu: Regex::new(r"#menu:([A-Za-z0-9_-]+)").unwrap(),
        customer: Regex::new(r"^\s*(?:点菜人|顾客|[Cc]ustomer)\s*[:：]\s*(.+?)\s*$").unwrap(),
        time: Regex::new(r"^\s*(?:时间|[Tt]ime)\s*[:：]\s*(.+?)\s*$").unwrap(),
        structured: Regex::new(
            r#"^\s*[-•*]?\s*name:"([^"]+)"\s+qty:(\d+)(?:\s+price:(\d+(?:\.\d+)?))?"#,
        )
        .unwrap(),
        loose: Regex::new(
            r"^\s*[-•*]?\s*(.+?)\s*[×xX*]\s*(\d+)(?:\s*[×xX*]\s*[¥￥]?(\d+(?:\.\d+)?))?",
        )
        .unwrap(),
    })
}

impl OrderSummary {
    /// 解析点菜单；不含 `#order` 或没有任何菜品时返回 None
    pub fn parse(content: &str) -> Option<Self> {
        if !content.contains(ORDER_TAG) {
            return None;
        }
        let p = patterns();
        let mut summary = OrderSummary {
            menu_id: p.menu.captures(content).map(|c| c[1].to_string()),
            ..Default::default()
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if summary.customer.is_none() {
                if let Some(c) = p.customer.captures(line) {
                    summary.customer = Some(c[1].trim().to_string());
                    continue;
                }
            }
            if summary.ordered_at.is_none() {
                if let Some(c) = p.time.captures(line) {
                    summary.ordered_at = Some(c[1].trim().to_string());
                    continue;
                }
            }
            if let Some(item) = parse_item(&p.structured, line).or_else(|| parse_item(&p.loose, line)) {
                summary.items.push(item);
            }
        }

        if summary.items.is_empty() {
            None
        } else {
            Some(summary)
        }
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.qty).sum()
    }

    /// 总金额；没有任何菜品带价格时为 None
    pub fn total_amount(&self) -> Option<f64> {
        if self.items.iter().all(|i| i.price.is_none()) {
            return None;
        }
        Some(
            self.items
                .iter()
                .filter_map(|i| i.price.map(|p| p * f64::from(i.qty)))
                .sum(),
        )
    }

    pub fn render(&self, style: SummaryStyle) -> String {
        let mut out = String::new();
        match style {
            SummaryStyle::Compact => {
                if let Some(menu) = &self.menu_id {
                    let _ = writeln!(out, "📋 Menu: {}", menu);
                }
            }
            SummaryStyle::Detailed => {
                if let Some(customer) = &self.customer {
                    let _ = writeln!(out, "Customer: {}", customer);
                }
                if let Some(at) = &self.ordered_at {
                    let _ = writeln!(out, "Time: {}", at);
                }
            }
        }

        let limit = style.item_limit();
        for item in self.items.iter().take(limit) {
            match item.price {
                Some(price) => {
                    let _ = writeln!(out, "- {} × {} × ¥{:.2}", item.name, item.qty, price);
                }
                None => {
                    let _ = writeln!(out, "- {} × {}", item.name, item.qty);
                }
            }
        }
        if self.items.len() > limit {
            let _ = writeln!(out, "... {} more", self.items.len() - limit);
        }

        let qty = self.total_quantity();
        let unit = if qty == 1 { "item" } else { "items" };
        match self.total_amount() {
            Some(amount) => {
                let _ = write!(out, "Total: {} {}, amount: ¥{:.2}", qty, unit, amount);
            }
            None => {
                let _ = write!(out, "Total: {} {}", qty, unit);
            }
        }
        out
    }
}

fn parse_item(re: &Regex, line: &str) -> Option<OrderItem> {
    let caps = re.captures(line)?;
    let name = caps.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }
    let qty = caps.get(2)?.as_str().parse().ok()?;
    let price = caps.get(3).and_then(|m| m.as_str().parse().ok());
    Some(OrderItem { name: name.to_string(), qty, price })
}

/// 推送正文用的精简摘要
pub fn summarize_order(content: &str) -> Option<String> {
    OrderSummary::parse(content).map(|s| s.render(SummaryStyle::Compact))
}

/// 含点菜人、时间的详细摘要
pub fn summarize_order_detailed(content: &str) -> Option<String> {
    OrderSummary::parse(content).map(|s| s.render(SummaryStyle::Detailed))
}
