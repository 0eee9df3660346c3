//! Parent / child resolution within a genotype filter.
//!
//! A child's variants carry the genotypes of both parents, so a parent's genotype
//! filter can be tested on the child's bucket instead of reading the parent's index.

use super::model::ParentFilter;
use crate::codec::genotype::{self, NUM_CODES};
use crate::types::QueryOperation;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Father and mother names, `None` when unknown or absent from the filter
pub type Parents = (Option<String>, Option<String>);

/// Whether a sample filter has no negated genotype.
///
/// Genotypes outside the index are rejected under OR, as every branch of a union must
/// be read from the index.
pub fn is_non_negated_filter(operation: QueryOperation, genotypes: &[String]) -> Result<bool> {
    let mut non_negated = true;
    for gt in genotypes {
        if operation == QueryOperation::Or && !genotype::is_valid_index_genotype(gt) {
            return Err(Error::InvalidGenotype(gt.clone()));
        }
        non_negated &= !genotype::is_negated(gt);
    }
    Ok(non_negated)
}

/// Samples of the filter with at least one parent also in the filter.
///
/// A child needs a non negated filter made only of indexed genotypes, since its bucket
/// is what gets read. Parents missing from the filter are reported as `None`.
pub fn find_children(
    genotypes: &BTreeMap<String, Vec<String>>,
    operation: QueryOperation,
    parents: &BTreeMap<String, Parents>,
) -> Result<BTreeMap<String, Parents>> {
    let mut children = BTreeMap::new();
    for (child, (father, mother)) in parents {
        let Some(child_genotypes) = genotypes.get(child) else {
            continue;
        };
        if !is_non_negated_filter(operation, child_genotypes)?
            || !child_genotypes.iter().all(|gt| genotype::is_valid_index_genotype(gt))
        {
            continue;
        }

        let in_filter = |parent: &Option<String>| {
            parent
                .as_ref()
                .filter(|p| genotypes.contains_key(p.as_str()))
                .cloned()
        };
        let father = in_filter(father);
        let mother = in_filter(mother);
        if father.is_some() || mother.is_some() {
            children.insert(child.clone(), (father, mother));
        }
    }
    Ok(children)
}

/// Codes of every genotype the parent may have. A negated genotype accepts anything.
pub fn build_parent_filter(genotypes: &[String]) -> ParentFilter {
    let mut filter = [false; NUM_CODES];
    for gt in genotypes {
        if genotype::is_negated(gt) {
            return [true; NUM_CODES];
        }
        filter[genotype::encode(gt) as usize] = true;
    }
    filter
}

/// A parent filter matches exactly the requested genotypes only without ambiguous codes
pub fn is_fully_covered_parent_filter(filter: &ParentFilter) -> bool {
    filter
        .iter()
        .enumerate()
        .all(|(code, accepted)| !accepted || !genotype::is_ambiguous_code(code as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::genotype::{HET_REF_UNPHASED, HOM_ALT_UNPHASED, HOM_REF_UNPHASED};

    fn gts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn trio_filter(child: &[&str], father: &[&str], mother: Option<&[&str]>) -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        map.insert("child".to_string(), gts(child));
        map.insert("father".to_string(), gts(father));
        if let Some(mother) = mother {
            map.insert("mother".to_string(), gts(mother));
        }
        map
    }

    fn parents() -> BTreeMap<String, Parents> {
        let mut map = BTreeMap::new();
        map.insert(
            "child".to_string(),
            (Some("father".to_string()), Some("mother".to_string())),
        );
        map
    }

    #[test]
    fn test_find_children() {
        let filter = trio_filter(&["0/1"], &["0/0"], None);
        let children = find_children(&filter, QueryOperation::And, &parents()).unwrap();
        assert_eq!(
            children.get("child"),
            Some(&(Some("father".to_string()), None))
        );
    }

    #[test]
    fn test_negated_child_is_not_a_child() {
        let filter = trio_filter(&["!0/1"], &["0/0"], Some(&["0/0"]));
        let children = find_children(&filter, QueryOperation::And, &parents()).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn test_child_without_parents_in_filter() {
        let mut filter = BTreeMap::new();
        filter.insert("child".to_string(), gts(&["0/1"]));
        let children = find_children(&filter, QueryOperation::And, &parents()).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn test_invalid_genotype_under_or() {
        let filter = trio_filter(&["0/0"], &["0/1"], None);
        let err = find_children(&filter, QueryOperation::Or, &parents()).unwrap_err();
        assert!(matches!(err, Error::InvalidGenotype(gt) if gt == "0/0"));
    }

    #[test]
    fn test_build_parent_filter() {
        let filter = build_parent_filter(&gts(&["0/0", "0/1", "1/0"]));
        let accepted: Vec<usize> = (0..NUM_CODES).filter(|c| filter[*c]).collect();
        assert_eq!(
            accepted,
            vec![HOM_REF_UNPHASED as usize, HET_REF_UNPHASED as usize]
        );
        assert!(is_fully_covered_parent_filter(&filter));
        assert!(!filter[HOM_ALT_UNPHASED as usize]);
    }

    #[test]
    fn test_ambiguous_parent_filter_is_not_covered() {
        let filter = build_parent_filter(&gts(&["0/1", "1/2"]));
        assert!(!is_fully_covered_parent_filter(&filter));
    }

    #[test]
    fn test_negated_parent_filter_accepts_everything() {
        let filter = build_parent_filter(&gts(&["!0/0"]));
        assert!(filter.iter().all(|v| *v));
        assert!(!is_fully_covered_parent_filter(&filter));
    }
}
