//! Code catalogue responses

use std::collections::BTreeMap;

use serde::Serialize;

use crate::detection::{codes, PolicyTable};

#[derive(Debug, Serialize)]
pub struct StatesResponse {
    pub states: BTreeMap<&'static str, u8>,
}

impl StatesResponse {
    pub fn from_policy(policy: &PolicyTable) -> Self {
        Self {
            states: policy.effective().into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CriterionInfo {
    pub alias: &'static str,
    pub description: String,
    pub criteria: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct CriteriaResponse {
    pub criteria: BTreeMap<&'static str, CriterionInfo>,
}

impl CriteriaResponse {
    pub fn catalogue() -> Self {
        let criteria = codes::CODE_TABLE
            .iter()
            .map(|info| {
                (
                    info.code,
                    CriterionInfo {
                        alias: info.alias,
                        description: codes::code_summary(info),
                        criteria: info.criteria().into_iter().map(|c| c.wire_name()).collect(),
                    },
                )
            })
            .collect();

        Self { criteria }
    }
}
