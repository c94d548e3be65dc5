use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of NeonOps tools. Each tool owns exactly one persona and one
/// conversation in a [`crate::state::SessionStore`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    Chat,
    ContractScanner,
    ThreadWriter,
    TokenomicsReview,
    AirdropChecker,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tool `{0}`")]
pub struct UnknownTool(pub String);

impl ToolId {
    pub const ALL: [ToolId; 5] = [
        ToolId::Chat,
        ToolId::ContractScanner,
        ToolId::ThreadWriter,
        ToolId::TokenomicsReview,
        ToolId::AirdropChecker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ContractScanner => "contract-scanner",
            Self::ThreadWriter => "thread-writer",
            Self::TokenomicsReview => "tokenomics-review",
            Self::AirdropChecker => "airdrop-checker",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Chat => "Ops Chat",
            Self::ContractScanner => "Contract Scanner",
            Self::ThreadWriter => "Thread Writer",
            Self::TokenomicsReview => "Tokenomics Review",
            Self::AirdropChecker => "Airdrop Checker",
        }
    }

    /// System instruction injected ahead of every request made for this tool.
    pub fn persona(&self) -> &'static str {
        match self {
            Self::Chat => {
                "You are NeonOps, a concise assistant for Web3 creators. Answer plainly, \
                 prefer short paragraphs and bullet lists, and say when you are unsure."
            }
            Self::ContractScanner => {
                "You are a smart-contract security reviewer. When given Solidity or a \
                 contract address description, list concrete risks (ownership, minting, \
                 fee switches, proxy upgrades, blacklist functions) ordered by severity. \
                 Never claim a contract is safe; state what you could not verify."
            }
            Self::ThreadWriter => {
                "You write punchy social media threads for crypto projects. Produce \
                 numbered posts under 280 characters each, no hashtags spam, no financial \
                 promises."
            }
            Self::TokenomicsReview => {
                "You analyse token supply schedules. Summarise allocation, vesting and \
                 emission, flag unlock cliffs and concentration risks, and show any \
                 arithmetic you rely on."
            }
            Self::AirdropChecker => {
                "You help users judge airdrop announcements. Identify likely scams \
                 (seed phrase requests, approval drains, fake domains) and list the \
                 checks a user should do before connecting a wallet."
            }
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = UnknownTool;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == normalized)
            .ok_or_else(|| UnknownTool(value.to_string()))
    }
}
