use std::fmt::{Display, Formatter};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::commitment::commit_public,
    data_structures::types::{Commitment, PublicKey},
    errors::ValidationError,
};

/// How much of an output is hidden
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Amount and receiver public, spent by reference
    Plain,
    /// Amount hidden behind a commitment, spent by reference
    Confidential,
    /// Amount hidden and spent through a ring over the anonymity set
    Anonymous,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [
        OutputKind::Plain,
        OutputKind::Confidential,
        OutputKind::Anonymous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Plain => "plain",
            OutputKind::Confidential => "confidential",
            OutputKind::Anonymous => "anonymous",
        }
    }

    pub fn has_range_proof(&self) -> bool {
        !matches!(self, OutputKind::Plain)
    }
}

impl Display for OutputKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "part" | "standard" => Ok(OutputKind::Plain),
            "confidential" | "blind" => Ok(OutputKind::Confidential),
            "anonymous" | "anon" => Ok(OutputKind::Anonymous),
            other => Err(ValidationError::Malformed(format!("unknown output kind '{other}'"))),
        }
    }
}

impl From<OutputKind> for u32 {
    fn from(kind: OutputKind) -> Self {
        match kind {
            OutputKind::Plain => 0,
            OutputKind::Confidential => 1,
            OutputKind::Anonymous => 2,
        }
    }
}

impl TryFrom<u32> for OutputKind {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputKind::Plain),
            1 => Ok(OutputKind::Confidential),
            2 => Ok(OutputKind::Anonymous),
            v => Err(ValidationError::Malformed(format!("invalid output kind {v}"))),
        }
    }
}

/// Kind specific part of an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum OutputBody {
    Plain {
        value: u64,
    },
    Confidential {
        commitment: Commitment,
        range_proof: Vec<u8>,
    },
    Anonymous {
        commitment: Commitment,
        range_proof: Vec<u8>,
    },
}

/// A transaction output paying a stealth one-time key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TxOutput {
    /// `P = Hs(shared || n)*G + B`
    pub one_time_key: PublicKey,
    /// Sender ephemeral public key `R = r*G`
    pub ephemeral_key: PublicKey,
    /// Amount and blinding factor sealed for the receiver; empty for plain outputs
    pub encrypted_data: Vec<u8>,
    pub body: OutputBody,
}

impl TxOutput {
    pub fn kind(&self) -> OutputKind {
        match self.body {
            OutputBody::Plain { .. } => OutputKind::Plain,
            OutputBody::Confidential { .. } => OutputKind::Confidential,
            OutputBody::Anonymous { .. } => OutputKind::Anonymous,
        }
    }

    /// Commitment to the output value. Plain outputs commit with zero blinding.
    pub fn commitment(&self) -> Commitment {
        match &self.body {
            OutputBody::Plain { value } => commit_public(*value),
            OutputBody::Confidential { commitment, .. } | OutputBody::Anonymous { commitment, .. } => {
                *commitment
            }
        }
    }

    pub fn range_proof(&self) -> Option<&[u8]> {
        match &self.body {
            OutputBody::Plain { .. } => None,
            OutputBody::Confidential { range_proof, .. }
            | OutputBody::Anonymous { range_proof, .. } => Some(range_proof),
        }
    }

    /// Cleartext value of a plain output
    pub fn plain_value(&self) -> Option<u64> {
        match self.body {
            OutputBody::Plain { value } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("anon".parse::<OutputKind>().unwrap(), OutputKind::Anonymous);
        assert_eq!("blind".parse::<OutputKind>().unwrap(), OutputKind::Confidential);
        assert_eq!("part".parse::<OutputKind>().unwrap(), OutputKind::Plain);
        assert!("ct".parse::<OutputKind>().is_err());
    }

    #[test]
    fn test_kind_u32_conversion() {
        for kind in OutputKind::ALL {
            assert_eq!(OutputKind::try_from(u32::from(kind)).unwrap(), kind);
        }
        assert!(OutputKind::try_from(9).is_err());
    }

    #[test]
    fn test_plain_commitment_is_public() {
        let output = TxOutput {
            one_time_key: PublicKey([0u8; 32]),
            ephemeral_key: PublicKey([0u8; 32]),
            encrypted_data: vec![],
            body: OutputBody::Plain { value: 10 },
        };
        assert_eq!(output.kind(), OutputKind::Plain);
        assert_eq!(output.commitment(), commit_public(10));
        assert!(output.range_proof().is_none());
    }
}
