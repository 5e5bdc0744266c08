//! Case specifiers: which cases a `run` or `list` should touch.
//!
//! `""` selects every case of every suite, `"SUITE"` every case of one
//! suite, `"SUITE/CASE"` a single case.

use std::collections::BTreeSet;

use hdat_error::{HdatError, Result};
use hdat_types::{ADDRESS_SEPARATOR, CaseAddress};

use crate::suite::SuiteRegistry;

/// Resolve one case specifier to addresses in suite declaration order.
pub fn resolve_casespec(registry: &SuiteRegistry, spec: &str) -> Result<Vec<CaseAddress>> {
    if spec.is_empty() {
        let mut cases = Vec::new();
        for (suite_id, _) in registry.iter() {
            cases.extend(suite_cases(registry, suite_id)?);
        }
        return Ok(cases);
    }

    let parts: Vec<&str> = spec.split(ADDRESS_SEPARATOR).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(HdatError::InvalidCaseSpec {
            spec: spec.to_owned(),
        });
    }
    match parts.as_slice() {
        [suite_id] => suite_cases(registry, suite_id),
        [suite_id, case_id] => {
            let known: Vec<String> = registry
                .cases(suite_id)?
                .into_iter()
                .map(|case| case.id)
                .collect();
            if known.iter().any(|id| id == case_id) {
                Ok(vec![CaseAddress::new(*suite_id, *case_id)])
            } else {
                Err(HdatError::MissingCase {
                    suite_id: (*suite_id).to_owned(),
                    case_id: (*case_id).to_owned(),
                    known,
                })
            }
        }
        _ => Err(HdatError::InvalidCaseSpec {
            spec: spec.to_owned(),
        }),
    }
}

/// Resolve several specifiers, keeping the first occurrence of each case.
pub fn resolve_casespecs<S: AsRef<str>>(
    registry: &SuiteRegistry,
    specs: &[S],
) -> Result<Vec<CaseAddress>> {
    let mut seen = BTreeSet::new();
    let mut cases = Vec::new();
    for spec in specs {
        for address in resolve_casespec(registry, spec.as_ref())? {
            if seen.insert(address.clone()) {
                cases.push(address);
            }
        }
    }
    Ok(cases)
}

fn suite_cases(registry: &SuiteRegistry, suite_id: &str) -> Result<Vec<CaseAddress>> {
    Ok(registry
        .cases(suite_id)?
        .into_iter()
        .map(|case| CaseAddress::new(suite_id, case.id))
        .collect())
}
