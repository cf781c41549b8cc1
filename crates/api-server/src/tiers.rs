use engine_core::{EngineError, EngineResult, SpreadKind, Tier, ToolName};
use serde::Deserialize;
use std::collections::HashMap;

/// Per-tool access policy for one tier.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolPolicy {
    pub enabled: bool,
    /// Runs per UTC day; `None` is unlimited.
    #[serde(default)]
    pub daily_quota: Option<i64>,
    #[serde(default)]
    pub ai_allowed: bool,
    /// Spread families the tier may analyze; `None` allows all six.
    #[serde(default)]
    pub spread_kinds: Option<Vec<SpreadKind>>,
}

impl ToolPolicy {
    fn disabled() -> Self {
        Self {
            enabled: false,
            daily_quota: Some(0),
            ai_allowed: false,
            spread_kinds: None,
        }
    }

    pub fn allows_spread(&self, kind: SpreadKind) -> bool {
        match &self.spread_kinds {
            None => true,
            Some(kinds) => kinds.contains(&kind),
        }
    }
}

/// Static tier -> tool access matrix, optionally overridden from a JSON
/// file at startup.
pub struct TierMatrix {
    matrix: HashMap<Tier, HashMap<ToolName, ToolPolicy>>,
}

impl TierMatrix {
    pub fn default_matrix() -> Self {
        let mut matrix = HashMap::new();

        // free: curated read-only subset, tight daily limits, no AI.
        let mut free = HashMap::new();
        for (tool, quota) in [
            (ToolName::AnalyzeSecurity, 10),
            (ToolName::AnalyzeFibonacci, 10),
            (ToolName::GetTradePlan, 5),
            (ToolName::CompareSecurities, 5),
            (ToolName::MorningBrief, 2),
        ] {
            free.insert(
                tool,
                ToolPolicy {
                    enabled: true,
                    daily_quota: Some(quota),
                    ai_allowed: false,
                    spread_kinds: Some(vec![]),
                },
            );
        }
        matrix.insert(Tier::Free, free);

        // pro: every tool, AI allowed, vertical spreads only.
        let mut pro = HashMap::new();
        for tool in ToolName::ALL {
            pro.insert(
                tool,
                ToolPolicy {
                    enabled: true,
                    daily_quota: Some(100),
                    ai_allowed: true,
                    spread_kinds: Some(vec![
                        SpreadKind::CallCredit,
                        SpreadKind::PutCredit,
                        SpreadKind::CallDebit,
                        SpreadKind::PutDebit,
                    ]),
                },
            );
        }
        matrix.insert(Tier::Pro, pro);

        // max: unlimited, all spreads.
        let mut max = HashMap::new();
        for tool in ToolName::ALL {
            max.insert(
                tool,
                ToolPolicy {
                    enabled: true,
                    daily_quota: None,
                    ai_allowed: true,
                    spread_kinds: None,
                },
            );
        }
        matrix.insert(Tier::Max, max);

        Self { matrix }
    }

    /// Load overrides from a JSON file shaped
    /// `{ "free": { "analyze_security": { "enabled": true, ... } } }`.
    /// Tools absent from the file keep the built-in defaults.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, HashMap<String, ToolPolicy>> = serde_json::from_str(&raw)?;

        let mut base = Self::default_matrix();
        for (tier_name, tools) in overrides {
            let tier = Tier::parse(&tier_name)
                .map_err(|e| anyhow::anyhow!("tier matrix file: {e}"))?;
            let entry = base.matrix.entry(tier).or_default();
            for (tool_name, policy) in tools {
                let tool = ToolName::parse(&tool_name)
                    .map_err(|e| anyhow::anyhow!("tier matrix file: {e}"))?;
                entry.insert(tool, policy);
            }
        }
        Ok(base)
    }

    pub fn policy(&self, tier: Tier, tool: ToolName) -> ToolPolicy {
        self.matrix
            .get(&tier)
            .and_then(|tools| tools.get(&tool))
            .cloned()
            .unwrap_or_else(ToolPolicy::disabled)
    }

    /// Authorization check; disabled tools surface as tier denials.
    pub fn check(&self, tier: Tier, tool: ToolName) -> EngineResult<ToolPolicy> {
        let policy = self.policy(tier, tool);
        if !policy.enabled {
            return Err(EngineError::TierDenied(tool.as_str().to_string()));
        }
        Ok(policy)
    }

    /// Presets are a pro+ affordance.
    pub fn presets_allowed(&self, tier: Tier) -> bool {
        !matches!(tier, Tier::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_is_curated() {
        let matrix = TierMatrix::default_matrix();
        assert!(matrix.check(Tier::Free, ToolName::AnalyzeSecurity).is_ok());
        assert!(matrix.check(Tier::Free, ToolName::ScanTrades).is_err());
        assert!(matrix.check(Tier::Free, ToolName::OptionsRiskAnalysis).is_err());
        assert!(!matrix.policy(Tier::Free, ToolName::AnalyzeSecurity).ai_allowed);
    }

    #[test]
    fn pro_allows_verticals_but_not_condors() {
        let matrix = TierMatrix::default_matrix();
        let policy = matrix.check(Tier::Pro, ToolName::OptionsRiskAnalysis).unwrap();
        assert!(policy.allows_spread(SpreadKind::CallCredit));
        assert!(!policy.allows_spread(SpreadKind::IronCondor));
        assert!(policy.ai_allowed);
    }

    #[test]
    fn max_is_unlimited() {
        let matrix = TierMatrix::default_matrix();
        for tool in ToolName::ALL {
            let policy = matrix.check(Tier::Max, tool).unwrap();
            assert!(policy.daily_quota.is_none());
            assert!(policy.allows_spread(SpreadKind::IronButterfly));
        }
    }
}
