//! Annotation sub-query shared by every sample: summary bits, consequence type and
//! biotype masks, population frequency ranges.

use super::coverage::CoverageLedger;
use super::model::{PopulationFrequencyQuery, SampleAnnotationIndexQuery};
use crate::codec::annotation::{
    INTERGENIC_MASK, LOF_EXTENDED_MASK, LOF_MASK, MISSENSE_VARIANT_MASK, POP_FREQ_ANY_001_MASK,
    PROTEIN_CODING_MASK,
};
use crate::codec::genotype::{is_negated, remove_negation};
use crate::codec::range::{DELTA, encode_range, equals_to};
use crate::codec::{EMPTY_MASK, mask_to_string};
use crate::query::{
    AnnotationCombination, Query, QueryParam, parse_consequence_type, parse_xrefs,
    split_operator, split_value,
};
use crate::schema::{INTERGENIC_VARIANT, IndexSchema, MISSENSE_VARIANT, NON_GENIC_TERMS};
use crate::types::QueryOperation;
use crate::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Distinct terms of a list filter, and whether they are joined with AND
fn terms(value: &str) -> Result<(Vec<String>, bool)> {
    let (op, terms) = split_value(value)?;
    let mut seen = BTreeSet::new();
    let terms = terms.into_iter().filter(|t| seen.insert(t.clone())).collect();
    Ok((terms, op == Some(QueryOperation::And)))
}

fn is_subset(terms: &[String], set: &[String]) -> bool {
    terms.iter().all(|t| set.contains(t))
}

/// A list filter equal to a whole summary set
fn is_whole_set(terms: &[String], set: &[String]) -> bool {
    is_subset(terms, set) && terms.len() == set.iter().collect::<BTreeSet<_>>().len()
}

#[derive(Default)]
struct MaskProof {
    /// Clause answered exactly by summary bits
    summary_exact: bool,
    /// Clause answered exactly by the mask, if the mask ends up in use
    mask_exact: bool,
    /// Clause has negated terms and adds nothing to the index query
    negated: bool,
}

impl MaskProof {
    fn negated() -> Self {
        Self {
            negated: true,
            ..Self::default()
        }
    }
}

pub fn parse_annotation_query(
    query: &Query,
    schema: &IndexSchema,
    complete_index: bool,
    ledger: &mut CoverageLedger,
) -> Result<SampleAnnotationIndexQuery> {
    let mut annotation_index = EMPTY_MASK;
    let mut consequence_type_mask = EMPTY_MASK as u16;
    let mut biotype_mask = EMPTY_MASK;
    let mut intergenic = None;

    let removable = complete_index
        && !query.contains(QueryParam::Gene)
        && AnnotationCombination::from_query(query).is_simple();

    if !query.contains(QueryParam::Region) {
        let xrefs = parse_xrefs(query)?;
        if !xrefs.genes.is_empty()
            && xrefs.ids.is_empty()
            && xrefs.variants.is_empty()
            && xrefs.other.is_empty()
        {
            intergenic = Some(false);
        }
    }

    let mut ct_proof = None;
    if let Some(value) = query.get(QueryParam::ConsequenceType) {
        let (raw, and) = terms(value)?;
        let so_terms = raw
            .iter()
            .map(|t| parse_consequence_type(remove_negation(t)))
            .collect::<Result<Vec<_>>>()?;

        ct_proof = Some(if raw.iter().any(|t| is_negated(t)) {
            debug!(value, "negated consequence type, no index restriction");
            MaskProof::negated()
        } else {
            if !so_terms.iter().any(|t| NON_GENIC_TERMS.contains(&t.as_str())) {
                intergenic = Some(false);
            } else if so_terms.len() == 1 && so_terms[0] == INTERGENIC_VARIANT {
                intergenic = Some(true);
            }

            let mut proof = MaskProof::default();
            let mut covered_by_summary = false;
            if is_subset(&so_terms, &schema.lof) {
                annotation_index |= LOF_MASK;
                covered_by_summary |= is_whole_set(&so_terms, &schema.lof);
            }
            if is_subset(&so_terms, &schema.lof_extended) {
                annotation_index |= LOF_EXTENDED_MASK;
                covered_by_summary |= is_whole_set(&so_terms, &schema.lof_extended);
            }
            if so_terms.len() == 1 && so_terms[0] == MISSENSE_VARIANT {
                annotation_index |= MISSENSE_VARIANT_MASK;
                covered_by_summary = true;
            }
            proof.summary_exact = covered_by_summary && !and;

            if !covered_by_summary {
                let mut exact = !and;
                for term in &so_terms {
                    let mask = schema.consequence_type_mask(term);
                    if mask == EMPTY_MASK as u16 {
                        consequence_type_mask = EMPTY_MASK as u16;
                        exact = false;
                        break;
                    }
                    consequence_type_mask |= mask;
                    exact &= !schema.is_imprecise_consequence_type_mask(mask);
                }
                proof.mask_exact = exact;
            }
            proof
        });
    }

    let mut bt_proof = None;
    if let Some(value) = query.get(QueryParam::Biotype) {
        let (biotypes, and) = terms(value)?;

        bt_proof = Some(if biotypes.iter().any(|t| is_negated(t)) {
            debug!(value, "negated biotype, no index restriction");
            MaskProof::negated()
        } else {
            intergenic = Some(false);

            let mut proof = MaskProof::default();
            let mut covered_by_summary = false;
            if is_subset(&biotypes, &schema.protein_coding_biotypes) {
                annotation_index |= PROTEIN_CODING_MASK;
                covered_by_summary = is_whole_set(&biotypes, &schema.protein_coding_biotypes);
            }
            proof.summary_exact = covered_by_summary && !and;

            if !covered_by_summary {
                let mut exact = !and;
                for biotype in &biotypes {
                    let mask = schema.biotype_mask(biotype);
                    if mask == EMPTY_MASK {
                        biotype_mask = EMPTY_MASK;
                        exact = false;
                        break;
                    }
                    biotype_mask |= mask;
                    exact &= !schema.is_imprecise_biotype_mask(mask);
                }
                proof.mask_exact = exact;
            }
            proof
        });
    }

    // Protein substitution scores only exist for missense variants. `<<` and `>>` also
    // accept variants without a score.
    if let Some(value) = query.get(QueryParam::ProteinSubstitution) {
        if !value.contains("<<") && !value.contains(">>") {
            annotation_index |= LOF_EXTENDED_MASK;
        }
        ledger.superset(QueryParam::ProteinSubstitution, "scores are not indexed");
    }

    let masks_in_use = intergenic == Some(false);
    for (param, proof) in [
        (QueryParam::ConsequenceType, ct_proof),
        (QueryParam::Biotype, bt_proof),
    ] {
        let Some(proof) = proof else { continue };
        if proof.negated {
            ledger.superset(param, "negated terms are not indexed");
        } else if !removable {
            ledger.superset(param, "index incomplete or clause combined with other filters");
        } else if proof.summary_exact || (proof.mask_exact && masks_in_use) {
            ledger.exact(param);
        } else {
            ledger.superset(param, "index codes are coarser than the filter");
        }
    }

    let population_frequency = parse_population_frequency(query, schema, complete_index, ledger)?;
    annotation_index |= population_frequency.summary;

    let mut annotation_index_mask = annotation_index;
    if let Some(intergenic) = intergenic {
        annotation_index_mask |= INTERGENIC_MASK;
        if intergenic {
            annotation_index |= INTERGENIC_MASK;
        }
    }
    if !masks_in_use {
        // Masks only discriminate within genes
        consequence_type_mask = EMPTY_MASK as u16;
        biotype_mask = EMPTY_MASK;
    }
    debug!(
        mask = %mask_to_string(annotation_index_mask),
        value = %mask_to_string(annotation_index),
        ?intergenic,
        "annotation summary"
    );

    Ok(SampleAnnotationIndexQuery {
        annotation_index_mask,
        annotation_index,
        consequence_type_mask,
        biotype_mask,
        population_frequency_operation: population_frequency.operation,
        population_frequency_queries: population_frequency.queries,
        population_frequency_partial: population_frequency.partial,
        intergenic,
    })
}

struct PopulationFrequencySubQuery {
    summary: u8,
    operation: QueryOperation,
    queries: Vec<PopulationFrequencyQuery>,
    partial: bool,
}

fn parse_population_frequency(
    query: &Query,
    schema: &IndexSchema,
    complete_index: bool,
    ledger: &mut CoverageLedger,
) -> Result<PopulationFrequencySubQuery> {
    let mut sub_query = PopulationFrequencySubQuery {
        summary: EMPTY_MASK,
        operation: QueryOperation::And,
        queries: Vec::new(),
        partial: false,
    };
    let param = QueryParam::PopulationAltFrequency;
    let Some(value) = query.get(param) else {
        return Ok(sub_query);
    };

    let (operation, terms) = split_value(value)?;
    let operation = operation.unwrap_or(QueryOperation::And);
    sub_query.operation = operation;

    let threshold = schema.pop_freq_any_threshold;
    let mut study_pops = BTreeSet::new();
    // Populations filtered below the rare variant threshold, and exactly at it
    let mut below_threshold = BTreeSet::new();
    let mut at_threshold = BTreeSet::new();
    let mut not_covered = Vec::new();

    for term in &terms {
        let (study_pop, op, number) = split_operator(term);
        let freq: f64 = number.parse().map_err(|_| {
            Error::InvalidQuery(format!("invalid population frequency filter '{}'", term))
        })?;
        study_pops.insert(study_pop.clone());
        if op == "<" || op == "<<" {
            if freq <= threshold || equals_to(freq, threshold) {
                below_threshold.insert(study_pop.clone());
            }
            if equals_to(freq, threshold) {
                at_threshold.insert(study_pop.clone());
            }
        }

        let range = schema.population_index(&study_pop).and_then(|slot| {
            let population = &schema.population_ranges[slot];
            encode_range(&op, freq, &population.thresholds, 0.0, 1.0 + DELTA)
                .ok()
                .map(|range| PopulationFrequencyQuery {
                    study: population.study.clone(),
                    population: population.population.clone(),
                    slot,
                    range,
                })
        });
        match range {
            Some(q) => {
                if !q.range.exact {
                    not_covered.push(term.clone());
                }
                sub_query.queries.push(q);
            }
            None => {
                sub_query.partial = true;
                not_covered.push(term.clone());
            }
        }
    }

    let any_set: BTreeSet<String> = schema.pop_freq_any.iter().cloned().collect();
    match operation {
        QueryOperation::Or => {
            let mut summary_exact = false;
            if !below_threshold.is_empty()
                && below_threshold.is_subset(&any_set)
                && study_pops == below_threshold
            {
                sub_query.summary |= POP_FREQ_ANY_001_MASK;
                if study_pops == any_set && at_threshold == study_pops && terms.len() == any_set.len() {
                    // The summary bit answers the whole filter
                    sub_query.queries.clear();
                    summary_exact = true;
                }
            }
            if sub_query.partial {
                // A union can not skip the populations missing from the index
                sub_query.queries.clear();
            }
            if complete_index && (summary_exact || (!sub_query.partial && not_covered.is_empty())) {
                ledger.exact(param);
            } else {
                ledger.superset(param, "population frequency union not covered by the index");
            }
        }
        QueryOperation::And => {
            if any_set.iter().any(|p| below_threshold.contains(p)) {
                sub_query.summary |= POP_FREQ_ANY_001_MASK;
            }
            if !complete_index {
                ledger.superset(param, "index incomplete");
            } else if not_covered.is_empty() {
                ledger.exact(param);
            } else if not_covered.len() == terms.len() {
                ledger.superset(param, "population frequency not covered by the index");
            } else {
                ledger.narrowed(param, not_covered.join(&QueryOperation::And.separator().to_string()));
            }
        }
    }

    Ok(sub_query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::annotation::NON_SNV_MASK;
    use crate::planner::coverage::Coverage;

    fn plan(query: &Query, complete_index: bool) -> (SampleAnnotationIndexQuery, CoverageLedger) {
        let schema = IndexSchema::default();
        let mut ledger = CoverageLedger::new();
        let annotation = parse_annotation_query(query, &schema, complete_index, &mut ledger).unwrap();
        (annotation, ledger)
    }

    fn lof() -> String {
        IndexSchema::default().lof.join(",")
    }

    fn is_superset(ledger: &CoverageLedger, param: QueryParam) -> bool {
        matches!(ledger.coverage(param), Some(Coverage::Superset(_)))
    }

    #[test]
    fn test_lof_set_uses_summary_bit() {
        let query = Query::new().with(QueryParam::ConsequenceType, lof());
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index & LOF_MASK, LOF_MASK);
        assert_eq!(annotation.consequence_type_mask, 0);
        assert_eq!(annotation.intergenic, Some(false));
        assert_eq!(ledger.coverage(QueryParam::ConsequenceType), Some(Coverage::Exact));
    }

    #[test]
    fn test_lof_set_kept_with_gene_or_incomplete_index() {
        let query = Query::new()
            .with(QueryParam::ConsequenceType, lof())
            .with(QueryParam::Gene, "BRCA2");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index & LOF_MASK, LOF_MASK);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));

        let query = Query::new().with(QueryParam::ConsequenceType, lof());
        let (_, ledger) = plan(&query, false);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_extended_lof_set() {
        let query = Query::new().with(
            QueryParam::ConsequenceType,
            IndexSchema::default().lof_extended.join(","),
        );
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index, LOF_EXTENDED_MASK);
        assert_eq!(ledger.coverage(QueryParam::ConsequenceType), Some(Coverage::Exact));
    }

    #[test]
    fn test_missense_alone() {
        let query = Query::new().with(QueryParam::ConsequenceType, "SO:0001583");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(
            annotation.annotation_index & MISSENSE_VARIANT_MASK,
            MISSENSE_VARIANT_MASK
        );
        assert_eq!(ledger.coverage(QueryParam::ConsequenceType), Some(Coverage::Exact));
    }

    #[test]
    fn test_lof_subset_uses_mask() {
        let query = Query::new().with(QueryParam::ConsequenceType, "stop_gained,frameshift_variant");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index & LOF_MASK, LOF_MASK);
        assert_eq!(annotation.consequence_type_mask, (1 << 5) | (1 << 1));
        assert_eq!(ledger.coverage(QueryParam::ConsequenceType), Some(Coverage::Exact));
    }

    #[test]
    fn test_and_terms_are_never_exact() {
        let query = Query::new().with(QueryParam::ConsequenceType, "stop_gained;frameshift_variant");
        let (_, ledger) = plan(&query, true);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_imprecise_and_unknown_terms() {
        let query = Query::new().with(QueryParam::ConsequenceType, "5_prime_UTR_variant");
        let (annotation, ledger) = plan(&query, true);
        assert_ne!(annotation.consequence_type_mask, 0);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));

        let query = Query::new().with(QueryParam::ConsequenceType, "intron_variant,stop_gained");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.consequence_type_mask, 0);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_intergenic_only() {
        let query = Query::new().with(QueryParam::ConsequenceType, "intergenic_variant");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.intergenic, Some(true));
        assert_eq!(annotation.annotation_index_mask, INTERGENIC_MASK);
        assert_eq!(annotation.annotation_index, INTERGENIC_MASK);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_undetermined_intergenic_disables_masks() {
        let query = Query::new()
            .with(QueryParam::ConsequenceType, "regulatory_region_variant,stop_gained");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.intergenic, None);
        assert_eq!(annotation.consequence_type_mask, 0);
        assert_eq!(annotation.annotation_index_mask & INTERGENIC_MASK, 0);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_genes_imply_genic() {
        let query = Query::new().with(QueryParam::Gene, "BRCA2");
        let (annotation, _) = plan(&query, true);
        assert_eq!(annotation.intergenic, Some(false));
        assert_eq!(annotation.annotation_index_mask, INTERGENIC_MASK);
        assert_eq!(annotation.annotation_index, 0);

        let query = Query::new()
            .with(QueryParam::Gene, "BRCA2")
            .with(QueryParam::Region, "13:1-100");
        let (annotation, _) = plan(&query, true);
        assert_eq!(annotation.intergenic, None);
    }

    #[test]
    fn test_biotype() {
        let query = Query::new().with(QueryParam::Biotype, "protein_coding");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index, PROTEIN_CODING_MASK);
        assert_eq!(annotation.biotype_mask, 0);
        assert_eq!(ledger.coverage(QueryParam::Biotype), Some(Coverage::Exact));

        let query = Query::new().with(QueryParam::Biotype, "miRNA,snRNA");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.biotype_mask, (1 << 3) | (1 << 5));
        assert_eq!(ledger.coverage(QueryParam::Biotype), Some(Coverage::Exact));

        let query = Query::new().with(QueryParam::Biotype, "lincRNA");
        let (_, ledger) = plan(&query, true);
        assert!(is_superset(&ledger, QueryParam::Biotype));
    }

    #[test]
    fn test_negated_terms_add_no_restriction() {
        let query = Query::new().with(QueryParam::ConsequenceType, "!missense_variant");
        let (annotation, ledger) = plan(&query, true);
        assert!(annotation.is_empty());
        assert_eq!(annotation.intergenic, None);
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));

        let query = Query::new().with(QueryParam::ConsequenceType, "stop_gained,!intron_variant");
        let (annotation, _) = plan(&query, true);
        assert_eq!(annotation.annotation_index, 0);
        assert_eq!(annotation.consequence_type_mask, 0);

        let query = Query::new()
            .with(QueryParam::Gene, "BRCA2")
            .with(QueryParam::Biotype, "!protein_coding");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.intergenic, Some(false));
        assert_eq!(annotation.annotation_index, 0);
        assert_eq!(annotation.biotype_mask, 0);
        assert!(is_superset(&ledger, QueryParam::Biotype));
    }

    #[test]
    fn test_combined_biotype_and_consequence_type_are_kept() {
        let query = Query::new()
            .with(QueryParam::Biotype, "protein_coding")
            .with(QueryParam::ConsequenceType, lof());
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(
            annotation.annotation_index,
            PROTEIN_CODING_MASK | LOF_MASK | LOF_EXTENDED_MASK
        );
        assert!(is_superset(&ledger, QueryParam::Biotype));
        assert!(is_superset(&ledger, QueryParam::ConsequenceType));
    }

    #[test]
    fn test_protein_substitution() {
        let query = Query::new().with(QueryParam::ProteinSubstitution, "sift<0.1");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index, LOF_EXTENDED_MASK);
        assert!(is_superset(&ledger, QueryParam::ProteinSubstitution));

        let query = Query::new().with(QueryParam::ProteinSubstitution, "sift<<0.1");
        let (annotation, _) = plan(&query, true);
        assert_eq!(annotation.annotation_index, 0);
    }

    #[test]
    fn test_population_frequency_not_indexed() {
        let query = Query::new().with(QueryParam::PopulationAltFrequency, "study:pop<0.0001");
        let (annotation, ledger) = plan(&query, true);
        assert!(annotation.population_frequency_partial);
        assert_eq!(annotation.annotation_index & POP_FREQ_ANY_001_MASK, 0);
        assert!(is_superset(&ledger, QueryParam::PopulationAltFrequency));
    }

    #[test]
    fn test_population_frequency_and_narrowed() {
        let query = Query::new().with(
            QueryParam::PopulationAltFrequency,
            "1kG_phase3:ALL<0.01;GNOMAD_GENOMES:ALL<0.002",
        );
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.population_frequency_queries.len(), 2);
        assert_eq!(annotation.population_frequency_operation, QueryOperation::And);
        assert_eq!(
            ledger.coverage(QueryParam::PopulationAltFrequency),
            Some(Coverage::Narrowed("GNOMAD_GENOMES:ALL<0.002".to_string()))
        );
    }

    #[test]
    fn test_population_frequency_and_rare_bit() {
        let query = Query::new().with(QueryParam::PopulationAltFrequency, "GNOMAD_GENOMES:ALL<0.001");
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(
            annotation.annotation_index & POP_FREQ_ANY_001_MASK,
            POP_FREQ_ANY_001_MASK
        );
        assert_eq!(
            ledger.coverage(QueryParam::PopulationAltFrequency),
            Some(Coverage::Exact)
        );
    }

    #[test]
    fn test_population_frequency_or_summary_bit() {
        let query = Query::new().with(
            QueryParam::PopulationAltFrequency,
            "1kG_phase3:ALL<0.001,GNOMAD_GENOMES:ALL<0.001",
        );
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index, POP_FREQ_ANY_001_MASK);
        assert!(annotation.population_frequency_queries.is_empty());
        assert_eq!(
            ledger.coverage(QueryParam::PopulationAltFrequency),
            Some(Coverage::Exact)
        );
    }

    #[test]
    fn test_population_frequency_or_below_threshold_is_not_exact() {
        let query = Query::new().with(
            QueryParam::PopulationAltFrequency,
            "1kG_phase3:ALL<0.0005,GNOMAD_GENOMES:ALL<0.0005",
        );
        let (annotation, ledger) = plan(&query, true);
        assert_eq!(annotation.annotation_index, POP_FREQ_ANY_001_MASK);
        assert_eq!(annotation.population_frequency_queries.len(), 2);
        assert!(is_superset(&ledger, QueryParam::PopulationAltFrequency));
    }

    #[test]
    fn test_population_frequency_or_partial() {
        let query = Query::new().with(
            QueryParam::PopulationAltFrequency,
            "1kG_phase3:ALL<0.01,other:ALL<0.01",
        );
        let (annotation, ledger) = plan(&query, true);
        assert!(annotation.population_frequency_partial);
        assert!(annotation.population_frequency_queries.is_empty());
        assert!(is_superset(&ledger, QueryParam::PopulationAltFrequency));
    }

    #[test]
    fn test_empty_query() {
        let (annotation, ledger) = plan(&Query::new(), true);
        assert!(annotation.is_empty());
        assert!(ledger.summary().is_empty());
        assert_eq!(annotation.annotation_index & NON_SNV_MASK, 0);
    }
}
