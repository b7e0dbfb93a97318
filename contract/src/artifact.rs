//! Compiled contract description shared by the deployer and the client.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::script::CODE;
use crate::ContractError;

pub const CONTRACT_NAME: &str = "OnchainImg";

/// Artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    pub name: String,
    pub index: u8,
    pub sighash: String,
    pub params: Vec<AbiParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProp {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub version: u32,
    pub contract: String,
    pub code_hex: String,
    pub abi: Vec<AbiEntry>,
    pub state_props: Vec<StateProp>,
}

fn param(name: &str, ty: &str) -> AbiParam {
    AbiParam {
        name: name.into(),
        ty: ty.into(),
    }
}

impl Artifact {
    /// Describe the contract linked into this binary.
    pub fn compile() -> Self {
        Self {
            version: ARTIFACT_VERSION,
            contract: CONTRACT_NAME.into(),
            code_hex: hex::encode(CODE),
            abi: vec![AbiEntry {
                name: "updateImg".into(),
                index: crate::script::UPDATE_IMG_INDEX,
                sighash: "SINGLE".into(),
                params: vec![param("imgRawBytes", "ByteString"), param("sig", "Sig")],
            }],
            state_props: vec![
                StateProp {
                    name: "pubkey".into(),
                    ty: "PubKey".into(),
                    mutable: false,
                },
                StateProp {
                    name: "imgRawBytes".into(),
                    ty: "ByteString".into(),
                    mutable: true,
                },
            ],
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ContractError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read an artifact and check it describes the linked contract.
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        let artifact: Artifact = serde_json::from_slice(&std::fs::read(path)?)?;
        artifact.check()?;
        Ok(artifact)
    }

    pub fn check(&self) -> Result<(), ContractError> {
        if self.contract != CONTRACT_NAME {
            return Err(ContractError::ArtifactMismatch(format!(
                "artifact is for {}, expected {CONTRACT_NAME}",
                self.contract
            )));
        }
        if self.version != ARTIFACT_VERSION {
            return Err(ContractError::ArtifactMismatch(format!(
                "artifact version {} unsupported",
                self.version
            )));
        }
        if self.code_hex != hex::encode(CODE) {
            return Err(ContractError::ArtifactMismatch(
                "code section differs, recompile the contract".into(),
            ));
        }
        Ok(())
    }
}
