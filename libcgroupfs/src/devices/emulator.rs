//! Reduces a possibly-redundant ordered list of rule updates down to a
//! minimal ruleset plus a default policy, ported from
//! `libcgroups::v2::devices::emulator::Emulator`: add rules one at a
//! time; a global (`type=any`) rule discards everything accumulated so
//! far and switches the default policy.

use super::rule::{DefaultPolicy, DeviceRule};

pub struct Emulator {
    pub default_policy: DefaultPolicy,
    pub rules: Vec<DeviceRule>,
}

impl Emulator {
    pub fn with_default_policy(default_policy: DefaultPolicy) -> Self {
        Emulator {
            default_policy,
            rules: Vec::new(),
        }
    }

    pub fn add_rules(&mut self, rules: &[DeviceRule]) {
        for rule in rules {
            self.add_rule(rule);
        }
    }

    pub fn add_rule(&mut self, rule: &DeviceRule) {
        if rule.is_global() {
            self.default_policy = match rule.allow {
                super::rule::Policy::Allow => DefaultPolicy::AllowList,
                super::rule::Policy::Deny => DefaultPolicy::DenyList,
            };
            self.rules.clear();
            return;
        }

        if rule.access.is_empty() {
            return;
        }

        self.rules.push(rule.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::super::rule::{Access, DeviceNumber, DeviceType, Policy};
    use super::*;

    fn rule(typ: DeviceType, access: Access, allow: Policy) -> DeviceRule {
        DeviceRule {
            typ,
            major: DeviceNumber::Wildcard,
            minor: DeviceNumber::Wildcard,
            access,
            allow,
        }
    }

    #[test]
    fn test_with_default_policy() {
        let em = Emulator::with_default_policy(DefaultPolicy::AllowList);
        assert_eq!(em.rules.len(), 0);
        assert!(em.default_policy.allows_by_default());
    }

    #[test]
    fn test_global_rule_resets() {
        let mut em = Emulator::with_default_policy(DefaultPolicy::DenyList);
        em.add_rule(&rule(DeviceType::Char, Access::READ, Policy::Allow));
        assert_eq!(em.rules.len(), 1);

        em.add_rule(&rule(DeviceType::Any, Access::empty(), Policy::Deny));
        assert_eq!(em.rules.len(), 0);
        assert!(!em.default_policy.allows_by_default());
    }

    #[test]
    fn test_empty_access_rule_discarded() {
        let mut em = Emulator::with_default_policy(DefaultPolicy::DenyList);
        em.add_rule(&rule(DeviceType::Block, Access::empty(), Policy::Allow));
        assert_eq!(em.rules.len(), 0);
    }

    #[test]
    fn test_normal_rule_accumulates() {
        let mut em = Emulator::with_default_policy(DefaultPolicy::DenyList);
        em.add_rule(&rule(DeviceType::Block, Access::READ, Policy::Allow));
        let top = em.rules.first().unwrap();
        assert_eq!(top.access, Access::READ);
    }
}
