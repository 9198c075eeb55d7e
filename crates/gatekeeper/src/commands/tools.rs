use crate::commands::bootstrap::build_tool_proxy;
use crate::config::AppConfig;
use anyhow::Result;

/// Print registered tools with the verdict the policy gives each
pub fn execute(config: &AppConfig) -> Result<()> {
    let proxy = build_tool_proxy(config)?;
    let policy = proxy.policy();

    println!("{:<16} {:<8} DESCRIPTION", "TOOL", "POLICY");
    for tool in proxy.registry().list() {
        let verdict = if policy.is_allowed(&tool.name, None) {
            "allow"
        } else {
            "deny"
        };
        println!("{:<16} {:<8} {}", tool.name, verdict, tool.description);
    }

    let snapshot = policy.snapshot();
    if !snapshot.denylist.is_empty() {
        println!("\nDenied by name: {}", snapshot.denylist.join(", "));
    }
    Ok(())
}
