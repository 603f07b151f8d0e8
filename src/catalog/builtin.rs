// Copyright 2026 Promptwall Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in detection rules.
//!
//! Thirty-plus regex and heuristic rules covering instruction override,
//! role-manipulation jailbreaks, system-prompt extraction, delimiter framing,
//! authority claims, data exfiltration, encoded payloads, indirect injection,
//! and shell injection in tool parameters. Deployments can replace the table
//! wholesale with a YAML catalog.

use super::{CatalogSpec, HeuristicKind, MatcherSpec, PatternSpec, ThreatCategory};

const W_CRITICAL: f64 = 0.95;
const W_HIGH: f64 = 0.8;
const W_MEDIUM: f64 = 0.5;
const W_HEURISTIC: f64 = 0.15;

fn re(id: &str, category: ThreatCategory, weight: f64, pattern: &str, desc: &str) -> PatternSpec {
    PatternSpec {
        id: id.to_string(),
        category,
        matcher: MatcherSpec::Regex(pattern.to_string()),
        weight,
        description: desc.to_string(),
    }
}

fn heuristic(id: &str, kind: HeuristicKind, desc: &str) -> PatternSpec {
    PatternSpec {
        id: id.to_string(),
        category: ThreatCategory::PromptInjection,
        matcher: MatcherSpec::Heuristic(kind),
        weight: W_HEURISTIC,
        description: desc.to_string(),
    }
}

pub fn builtin_catalog() -> CatalogSpec {
    use ThreatCategory::*;

    let patterns = vec![
        // Direct instruction override (categorized as jailbreak)
        re(
            "ignore_previous",
            Jailbreak,
            W_CRITICAL,
            r"ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?)",
            "Attempts to override previous instructions",
        ),
        re(
            "disregard_instructions",
            Jailbreak,
            W_CRITICAL,
            r"disregard\s+(all\s+)?(previous|prior|your)\s+(instructions?|guidelines?|rules?)",
            "Disregard instruction attack",
        ),
        re(
            "forget_instructions",
            Jailbreak,
            W_HIGH,
            r"forget\s+(all\s+)?(previous|prior|your)\s+(instructions?|context|rules?)",
            "Forget instructions attack",
        ),
        re(
            "new_instructions",
            Jailbreak,
            W_CRITICAL,
            r"(your\s+)?new\s+(instructions?|task)\s+(are|is|:)",
            "New instruction injection",
        ),
        re(
            "override_mode",
            Jailbreak,
            W_CRITICAL,
            r"(override|bypass)\s+(mode|safety|security|restrictions?|filters?)",
            "Override safety controls",
        ),
        // Role manipulation / jailbreak
        re(
            "you_are_now",
            Jailbreak,
            W_HIGH,
            r"you\s+are\s+now\s+(a|an|my|the)\s+",
            "Role reassignment attack",
        ),
        re(
            "act_as",
            Jailbreak,
            W_HIGH,
            r"(act|behave|pretend|respond)\s+(as|like)\s+(a|an|if)\s+",
            "Role-play jailbreak",
        ),
        re(
            "developer_mode",
            Jailbreak,
            W_CRITICAL,
            r"(developer|debug|admin|god|sudo|root)\s+mode",
            "Privileged mode activation attempt",
        ),
        re(
            "dan_jailbreak",
            Jailbreak,
            W_CRITICAL,
            r"\bDAN\b.*\b(do\s+anything|jailbreak|no\s+restrictions)\b",
            "DAN (Do Anything Now) jailbreak",
        ),
        re(
            "hypothetical_scenario",
            Jailbreak,
            W_MEDIUM,
            r"(hypothetically|theoretically|in\s+a\s+(fictional|world))\s+.{0,30}(no\s+rules|no\s+restrictions|anything)",
            "Hypothetical scenario bypass",
        ),
        // System prompt extraction
        re(
            "reveal_system_prompt",
            SystemPromptLeak,
            W_CRITICAL,
            r"(reveal|show|display|print|output|repeat|tell\s+me)\s+(the\s+|your\s+)?(system\s+prompt|initial\s+instructions?|system\s+message|hidden\s+prompt)",
            "System prompt extraction attempt",
        ),
        re(
            "what_are_your_instructions",
            SystemPromptLeak,
            W_HIGH,
            r"what\s+(are|were)\s+your\s+(initial|original|system|hidden)\s+(instructions?|prompt|rules?)",
            "Instruction probing",
        ),
        re(
            "repeat_above",
            SystemPromptLeak,
            W_HIGH,
            r"repeat\s+(the\s+)?(text|words?|content)\s+(above|before|preceding)",
            "Repeat-above extraction",
        ),
        re(
            "begin_with_prefix",
            SystemPromptLeak,
            W_MEDIUM,
            r#"(start|begin)\s+(your\s+)?(response|reply|answer)\s+with\s+['"]"#,
            "Prefix-forcing prompt leak",
        ),
        // Delimiter / framing attacks
        re(
            "system_delimiter",
            PromptInjection,
            W_CRITICAL,
            r"(</?(system|instruction|prompt|context)>|\[/?SYSTEM\]|---\s*SYSTEM\s*---)",
            "Fake system delimiter injection",
        ),
        re(
            "markdown_delimiter",
            PromptInjection,
            W_HIGH,
            r"```\s*(system|instruction|admin|root)\b",
            "Markdown code-block delimiter attack",
        ),
        re(
            "xml_injection",
            PromptInjection,
            W_HIGH,
            r"<\s*(message|turn|human|assistant|tool_result)\s*(role\s*=)?",
            "XML message structure injection",
        ),
        // Authority claims
        re(
            "admin_authority",
            PrivilegeEscalation,
            W_HIGH,
            r"(i\s+am|i'm)\s+(an?\s+)?(admin|administrator|developer|system\s+operator|root\s+user)",
            "False authority claim",
        ),
        re(
            "authorized_override",
            PrivilegeEscalation,
            W_HIGH,
            r"(authorized|permitted|allowed)\s+to\s+(override|bypass|ignore|skip)",
            "Authorized override claim",
        ),
        re(
            "emergency_override",
            PrivilegeEscalation,
            W_HIGH,
            r"(emergency|critical|urgent)\s+(override|access|protocol)",
            "Emergency override claim",
        ),
        // Data exfiltration
        re(
            "send_data_to",
            DataExfiltration,
            W_CRITICAL,
            r"(send|transmit|forward|email|post)\s+.{0,40}(to|at)\s+(http|https|ftp|mailto|webhook)",
            "Data exfiltration to external URL",
        ),
        re(
            "encode_and_output",
            DataExfiltration,
            W_MEDIUM,
            r"(encode|encrypt|base64|hex)\s+.{0,30}(output|return|send|print)",
            "Encoded data exfiltration",
        ),
        re(
            "exfil_via_image",
            DataExfiltration,
            W_HIGH,
            r"!\[.*\]\(https?://.*\?.*=",
            "Data exfiltration via markdown image URL",
        ),
        // Encoded / obfuscated payloads
        re(
            "base64_payload",
            PromptInjection,
            W_HIGH,
            r"(decode|execute|eval|run)\s+(this\s+)?base64\s*[:\-]?\s*[A-Za-z0-9+/]{20,}",
            "Base64 encoded payload",
        ),
        re(
            "unicode_homoglyph",
            PromptInjection,
            W_MEDIUM,
            r"[\u{0400}-\u{04FF}\u{0370}-\u{03FF}]{3,}",
            "Unicode homoglyph obfuscation",
        ),
        re(
            "zero_width_chars",
            PromptInjection,
            W_HIGH,
            r"[\u{200b}\u{200c}\u{200d}\u{2060}\u{feff}]{2,}",
            "Zero-width character hiding",
        ),
        // Indirect injection (in tool outputs / retrieved data)
        re(
            "indirect_system_instruction",
            PromptInjection,
            W_CRITICAL,
            r"(SYSTEM|AI|ASSISTANT)\s*(INSTRUCTION|DIRECTIVE|COMMAND)\s*:",
            "Indirect injection via data: fake system instruction",
        ),
        re(
            "indirect_ignore_user",
            PromptInjection,
            W_CRITICAL,
            r"(ignore|disregard)\s+(the\s+)?(user|human|operator)",
            "Indirect injection: ignore user directive",
        ),
        re(
            "tool_output_injection",
            PromptInjection,
            W_HIGH,
            r"(IMPORTANT|CRITICAL|URGENT)\s*:\s*(you\s+must|always|never|instead)",
            "Injection in tool output masquerading as priority instruction",
        ),
        re(
            "data_poisoning",
            PromptInjection,
            W_CRITICAL,
            r"(when\s+asked|if\s+the\s+user|from\s+now\s+on)\s+.{0,50}(always|never|instead)\s+(say|respond|answer|output)",
            "Data poisoning: persistent behavior modification",
        ),
        // Shell / command injection in tool params
        re(
            "shell_metachar",
            PromptInjection,
            W_CRITICAL,
            r"[;&|`$]\s*(rm|cat|curl|wget|nc|bash|sh|python|perl|ruby)\s",
            "Shell metacharacter command injection",
        ),
        re(
            "reverse_shell",
            PromptInjection,
            W_CRITICAL,
            r#"(bash\s+-i|/dev/tcp/|nc\s+-e|python\s+-c\s+['"]import\s+socket)"#,
            "Reverse shell attempt",
        ),
        // Heuristics
        heuristic(
            "high_entropy",
            HeuristicKind::ShannonEntropy {
                threshold: 4.5,
                min_length: 20,
            },
            "High character entropy suggests an encoded payload",
        ),
        heuristic(
            "high_repetition",
            HeuristicKind::RepetitionRatio {
                threshold: 0.6,
                min_length: 50,
            },
            "Repeated substrings suggest prompt stuffing",
        ),
        heuristic(
            "length_anomaly",
            HeuristicKind::LengthAnomaly { max_length: 10_000 },
            "Unusually long input",
        ),
    ];

    CatalogSpec {
        version: 1,
        patterns,
    }
}
