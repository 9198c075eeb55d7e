//! Pre-authored rules activated when the classifier detects a domain.

use std::collections::BTreeMap;

use crate::guardrails::{DynamicRule, RuleKind, RuleSeverity};

fn template(
    rule_id: &str,
    domain: &str,
    kind: RuleKind,
    severity: RuleSeverity,
    description: &str,
    condition: &str,
    action: &str,
) -> DynamicRule {
    DynamicRule {
        rule_id: rule_id.to_string(),
        domain: domain.to_string(),
        kind,
        description: description.to_string(),
        severity,
        condition: condition.to_string(),
        action: action.to_string(),
    }
}

pub struct RuleTemplates {
    by_domain: BTreeMap<&'static str, Vec<DynamicRule>>,
}

impl RuleTemplates {
    pub fn builtin() -> Self {
        use RuleKind::*;
        use RuleSeverity::*;

        let mut by_domain = BTreeMap::new();
        by_domain.insert(
            "medical",
            vec![
                template(
                    "med_disclaimer",
                    "medical",
                    RequireDisclaimer,
                    High,
                    "Add a disclaimer: this does not replace a consultation with a doctor",
                    "Any medical advice",
                    "Remind the user to consult a doctor",
                ),
                template(
                    "med_no_diagnosis",
                    "medical",
                    Warn,
                    High,
                    "Warn when the conversation attempts a diagnosis",
                    "Request to diagnose a condition",
                    "Warn that an AI cannot diagnose illnesses",
                ),
                template(
                    "med_block_surgery",
                    "medical",
                    Block,
                    Critical,
                    "Block instructions for surgical procedures",
                    "Request for surgery or self-treatment instructions",
                    "Block and refer to a doctor",
                ),
                template(
                    "med_no_dosage",
                    "medical",
                    Block,
                    Critical,
                    "Block specific medication dosages",
                    "Request for specific drug dosages",
                    "Block and refer to a pharmacist or doctor",
                ),
            ],
        );
        by_domain.insert(
            "financial",
            vec![
                template(
                    "fin_disclaimer",
                    "financial",
                    RequireDisclaimer,
                    High,
                    "Add a disclaimer: this is not investment advice",
                    "Discussion of investments or financial decisions",
                    "Add a risk warning",
                ),
                template(
                    "fin_no_specific_advice",
                    "financial",
                    Warn,
                    High,
                    "Warn on specific investment recommendations",
                    "Recommendation to buy or sell specific assets",
                    "Suggest consulting a financial advisor",
                ),
                template(
                    "fin_regulatory",
                    "financial",
                    RequireDisclaimer,
                    Medium,
                    "Mention applicable regulatory requirements",
                    "Discussion of regulated financial products",
                    "Note the regulatory restrictions",
                ),
            ],
        );
        by_domain.insert(
            "legal",
            vec![
                template(
                    "legal_disclaimer",
                    "legal",
                    RequireDisclaimer,
                    High,
                    "Add a disclaimer: this is not legal advice",
                    "Any legal question",
                    "Recommend consulting a lawyer",
                ),
                template(
                    "legal_no_representation",
                    "legal",
                    Block,
                    High,
                    "Block drafting of legal documents",
                    "Request to draft contracts, lawsuits or wills",
                    "Block and refer to a lawyer",
                ),
            ],
        );
        by_domain.insert(
            "code_security",
            vec![
                template(
                    "code_no_exploits",
                    "code_security",
                    Block,
                    Critical,
                    "Block creation of malicious code",
                    "Request to write exploits, malware or viruses",
                    "Block the request",
                ),
                template(
                    "code_review_security",
                    "code_security",
                    Warn,
                    Medium,
                    "Warn about potential vulnerabilities in generated code",
                    "Generated code with potential vulnerabilities",
                    "Add a security warning",
                ),
            ],
        );
        by_domain.insert(
            "data_privacy",
            vec![
                template(
                    "privacy_no_pii",
                    "data_privacy",
                    Block,
                    Critical,
                    "Block requests to collect personal data",
                    "Collecting or processing personal data without consent",
                    "Block and explain data protection requirements",
                ),
                template(
                    "privacy_gdpr",
                    "data_privacy",
                    RequireDisclaimer,
                    High,
                    "Mention GDPR when personal data processing is discussed",
                    "Discussion of personal data processing",
                    "Add information about applicable law",
                ),
            ],
        );
        by_domain.insert(
            "tool_restrictions",
            vec![
                template(
                    "tool_no_system_cmd",
                    "tool_restrictions",
                    Block,
                    Critical,
                    "Block execution of system commands through tools",
                    "Attempt to run shell commands or system operations",
                    "Block the tool call",
                ),
                template(
                    "tool_no_external_send",
                    "tool_restrictions",
                    Block,
                    Critical,
                    "Block sending data to external services",
                    "Attempt to send email or HTTP requests with sensitive data",
                    "Block the tool call",
                ),
            ],
        );

        Self { by_domain }
    }

    pub fn for_domain(&self, domain: &str) -> &[DynamicRule] {
        self.by_domain.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn domains(&self) -> Vec<&'static str> {
        self.by_domain.keys().copied().collect()
    }

    pub fn find(&self, rule_id: &str) -> Option<&DynamicRule> {
        self.by_domain
            .values()
            .flatten()
            .find(|r| r.rule_id == rule_id)
    }
}

impl Default for RuleTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}
