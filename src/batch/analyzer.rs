//! 因子名解析与共享依赖分析
//!
//! @yutiansut @quantaxis
//!
//! 将 "族名_周期" 形式的因子名解析为带标签的因子族，
//! 并分析一批因子名共享哪些基础序列 (一步收益率、收盘/最高/最低)，
//! 使共享基础在批内只计算一次。

use std::collections::{BTreeSet, HashMap};

/// 因子族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactorFamily {
    /// 简单移动平均 sma_N
    Sma,
    /// 指数移动平均 ema_N
    Ema,
    /// 相对强弱 rsi_N
    Rsi,
    /// 顺势指标 cci_N
    Cci,
    /// 归一化真实波幅 natr_N
    Natr,
    /// N 步收益率 ret_N
    Ret,
    /// 滚动波动率 (收益率标准差) vol_N
    Vol,
    /// 滚动偏度 skew_N
    Skew,
    /// 滚动峰度 kurt_N
    Kurt,
}

impl FactorFamily {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sma" => Some(Self::Sma),
            "ema" => Some(Self::Ema),
            "rsi" => Some(Self::Rsi),
            "cci" => Some(Self::Cci),
            "natr" => Some(Self::Natr),
            "ret" => Some(Self::Ret),
            "vol" => Some(Self::Vol),
            "skew" => Some(Self::Skew),
            "kurt" => Some(Self::Kurt),
            _ => None,
        }
    }

    /// 该族计算所需的基础序列
    pub fn base_series(&self) -> &'static [BaseSeries] {
        match self {
            Self::Sma | Self::Ema | Self::Rsi | Self::Ret => &[BaseSeries::Close],
            Self::Cci | Self::Natr => {
                &[BaseSeries::High, BaseSeries::Low, BaseSeries::Close]
            }
            // 波动率族全部建立在一步收益率之上
            Self::Vol | Self::Skew | Self::Kurt => &[BaseSeries::Returns, BaseSeries::Close],
        }
    }
}

/// 基础序列 - 多个因子族共享的前置计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseSeries {
    /// 一步收益率 (由收盘价导出)
    Returns,
    Close,
    High,
    Low,
}

impl BaseSeries {
    pub fn cache_name(&self) -> &'static str {
        match self {
            Self::Returns => "__base_returns",
            Self::Close => "__base_close",
            Self::High => "__base_high",
            Self::Low => "__base_low",
        }
    }
}

/// 已识别的因子：族 + 周期
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFactor {
    pub name: String,
    pub family: FactorFamily,
    pub period: usize,
}

/// 因子依赖分析器
#[derive(Debug, Default, Clone)]
pub struct FactorDependencyAnalyzer;

impl FactorDependencyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// 解析单个因子名；不符合 "族名_周期" 约定时返回 None
    pub fn parse(&self, name: &str) -> Option<ParsedFactor> {
        let (prefix, period_str) = name.rsplit_once('_')?;
        let family = FactorFamily::from_prefix(&prefix.to_ascii_lowercase())?;
        let period: usize = period_str.parse().ok()?;
        if period == 0 {
            return None;
        }
        Some(ParsedFactor {
            name: name.to_string(),
            family,
            period,
        })
    }

    /// 按族分组
    ///
    /// 返回 族 -> [(原始名, 周期)]；未识别的名字不在结果中。
    pub fn group_similar_factors(
        &self,
        names: &[String],
    ) -> HashMap<FactorFamily, Vec<(String, usize)>> {
        let mut groups: HashMap<FactorFamily, Vec<(String, usize)>> = HashMap::new();
        for name in names {
            if let Some(parsed) = self.parse(name) {
                groups
                    .entry(parsed.family)
                    .or_default()
                    .push((parsed.name, parsed.period));
            }
        }
        groups
    }

    /// 共享依赖分析
    ///
    /// 返回这批因子需要预计算的全部基础序列 (有序去重)。
    pub fn identify_shared_dependencies(&self, names: &[String]) -> BTreeSet<BaseSeries> {
        let mut bases = BTreeSet::new();
        for name in names {
            if let Some(parsed) = self.parse(name) {
                for base in parsed.family.base_series() {
                    bases.insert(*base);
                }
            }
        }
        bases
    }

    /// 未被任何族识别的名字 (走通用回调)
    pub fn unrecognized<'n>(&self, names: &'n [String]) -> Vec<&'n String> {
        names.iter().filter(|n| self.parse(n).is_none()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> FactorDependencyAnalyzer {
        FactorDependencyAnalyzer::new()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_known_families() {
        let a = analyzer();
        let p = a.parse("ema_20").unwrap();
        assert_eq!(p.family, FactorFamily::Ema);
        assert_eq!(p.period, 20);

        assert_eq!(a.parse("natr_14").unwrap().family, FactorFamily::Natr);
        assert_eq!(a.parse("skew_10").unwrap().family, FactorFamily::Skew);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let a = analyzer();
        assert!(a.parse("ema").is_none());
        assert!(a.parse("ema_").is_none());
        assert!(a.parse("ema_abc").is_none());
        assert!(a.parse("ema_0").is_none());
        assert!(a.parse("unknown_5").is_none());
    }

    #[test]
    fn test_grouping() {
        let a = analyzer();
        let groups = a.group_similar_factors(&names(&[
            "ema_5", "ema_10", "ema_20", "rsi_14", "custom_factor",
        ]));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&FactorFamily::Ema].len(), 3);
        assert_eq!(groups[&FactorFamily::Rsi].len(), 1);
    }

    #[test]
    fn test_shared_dependencies_for_volatility_family() {
        let a = analyzer();
        let bases = a.identify_shared_dependencies(&names(&["vol_10", "skew_10", "ret_5"]));

        // 波动率与偏度共享一步收益率；三者都要收盘价
        assert!(bases.contains(&BaseSeries::Returns));
        assert!(bases.contains(&BaseSeries::Close));
        assert!(!bases.contains(&BaseSeries::High));
    }

    #[test]
    fn test_shared_dependencies_for_channel_family() {
        let a = analyzer();
        let bases = a.identify_shared_dependencies(&names(&["cci_20", "natr_14"]));
        assert!(bases.contains(&BaseSeries::High));
        assert!(bases.contains(&BaseSeries::Low));
        assert!(bases.contains(&BaseSeries::Close));
    }

    #[test]
    fn test_unrecognized_fallback_list() {
        let a = analyzer();
        let all = names(&["ema_5", "my_special", "obv"]);
        let rest = a.unrecognized(&all);
        assert_eq!(rest.len(), 2);
    }
}
