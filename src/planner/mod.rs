//! Sample index query planner.
//!
//! Turns a logical [`Query`] into index lookups ([`SampleIndexQuery`]) plus the residual
//! query that still has to be applied to the returned variants. Clauses are only removed
//! from the residual when the index answers them exactly. The input query is never
//! modified.

pub mod annotation;
pub mod coverage;
pub mod file;
pub mod model;
pub mod trio;

pub use coverage::{Coverage, CoverageLedger};
pub use model::{
    ParentFilter, Plan, PopulationFrequencyQuery, SampleAnnotationIndexQuery, SampleFileIndexQuery,
    SampleIndexQuery, SingleSampleIndexQuery,
};

use crate::codec::genotype::{is_main_alt, is_negated, is_valid_index_genotype};
use crate::metadata::{MetadataProvider, StudyMetadata};
use crate::query::{Query, QueryParam, parse_genotype_filter, parse_xrefs, split_value};
use crate::schema::IndexSchema;
use crate::types::{QueryOperation, Region, VariantType, merge_regions, parse_regions};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Samples to read and how their results combine
#[derive(Debug, Default)]
struct SampleSelection {
    operation: QueryOperation,
    samples: BTreeMap<String, Vec<String>>,
    father_filters: BTreeMap<String, ParentFilter>,
    mother_filters: BTreeMap<String, ParentFilter>,
    mendelian_error_samples: BTreeSet<String>,
    only_de_novo: bool,
    partial: bool,
    /// Samples filtered only by the residual query
    residual_only: Vec<String>,
}

pub struct SampleIndexQueryParser<'a, M: MetadataProvider + ?Sized> {
    metadata: &'a M,
    schema: &'a IndexSchema,
}

impl<'a, M: MetadataProvider + ?Sized> SampleIndexQueryParser<'a, M> {
    pub fn new(metadata: &'a M, schema: &'a IndexSchema) -> Result<Self> {
        schema.validate()?;
        Ok(Self { metadata, schema })
    }

    /// Whether the sample index can answer `query`
    pub fn valid_sample_index_query(query: &Query) -> Result<bool> {
        Ok(Self::ineligibility(query)?.is_none())
    }

    /// Reason why `query` can not use the sample index, if any
    fn ineligibility(query: &Query) -> Result<Option<&'static str>> {
        let xrefs = parse_xrefs(query)?;
        if !xrefs.ids.is_empty() || !xrefs.variants.is_empty() || !xrefs.other.is_empty() {
            return Ok(Some("variant ids and cross references are not indexed"));
        }

        if let Some(value) = query.get(QueryParam::Genotype) {
            let (operation, samples) = parse_genotype_filter(value)?;
            let mut any_valid = false;
            for (_, gts) in &samples {
                let non_negated = trio::is_non_negated_filter(operation, gts)?;
                let valid = non_negated && gts.iter().all(|gt| is_valid_index_genotype(gt));
                if operation == QueryOperation::Or && !non_negated {
                    return Ok(Some("negated genotypes can not be read from the index under OR"));
                }
                any_valid |= valid;
            }
            return Ok(if any_valid {
                None
            } else {
                Some("no sample filtered by indexed genotypes only")
            });
        }

        if query.contains_non_negated(QueryParam::Sample) {
            let (operation, samples) = split_value(query.get(QueryParam::Sample).unwrap_or_default())?;
            if operation == Some(QueryOperation::Or) && samples.iter().any(|s| is_negated(s)) {
                return Ok(Some("negated samples can not be read from the index under OR"));
            }
            return Ok(None);
        }

        if query.contains_non_negated(QueryParam::SampleMendelianError)
            || query.contains_non_negated(QueryParam::SampleDeNovo)
        {
            return Ok(None);
        }

        Ok(Some("no sample filter"))
    }

    pub fn parse(&self, query: &Query) -> Result<Plan> {
        if let Some(reason) = Self::ineligibility(query)? {
            warn!(reason, "query can not use the sample index");
            return Ok(Plan::Ineligible {
                reason: reason.to_string(),
            });
        }

        let mut ledger = CoverageLedger::new();
        let regions = self.parse_regions(query, &mut ledger)?;

        let study = self.metadata.study(query.get(QueryParam::Study))?;
        let loaded = study.loaded_genotypes();
        let main_genotypes: Vec<String> = loaded
            .into_iter()
            .filter(|gt| is_valid_index_genotype(gt) && is_main_alt(gt))
            .collect();

        let selection = if let Some(value) = query.get(QueryParam::Genotype) {
            self.select_by_genotype(query, value, &study, &mut ledger)?
        } else if query.contains_non_negated(QueryParam::Sample) {
            self.select_by_sample(query, &study, &main_genotypes, &mut ledger)?
        } else if query.contains_non_negated(QueryParam::SampleMendelianError) {
            self.select_mendelian(query, QueryParam::SampleMendelianError, &study, &main_genotypes, &mut ledger)?
        } else {
            self.select_mendelian(query, QueryParam::SampleDeNovo, &study, &main_genotypes, &mut ledger)?
        };
        let selection = match selection {
            Ok(selection) => selection,
            Err(reason) => {
                warn!(%reason, "query can not use the sample index");
                return Ok(Plan::Ineligible { reason });
            }
        };
        if selection.samples.is_empty() {
            return Ok(Plan::Ineligible {
                reason: "no sample left to read from the index".to_string(),
            });
        }

        let mut file_queries = BTreeMap::new();
        let mut all_annotated = selection.residual_only.is_empty();
        for name in selection.samples.keys() {
            let sample = self.metadata.sample(study.id, name)?;
            if !sample.index_status.is_ready() {
                let reason = format!("sample index of '{}' is not ready", name);
                warn!(%reason, "query can not use the sample index");
                return Ok(Plan::Ineligible { reason });
            }
            all_annotated &= sample.annotation_status.is_ready();
            let file_query =
                file::parse_file_query(query, name, &sample.files, self.schema, &mut ledger)?;
            file_queries.insert(name.clone(), file_query);
        }

        let complete_index = all_annotated && !selection.partial;
        debug!(complete_index, partial = selection.partial, "annotation coverage");
        let annotation_query =
            annotation::parse_annotation_query(query, self.schema, complete_index, &mut ledger)?;

        let variant_types = match query.get(QueryParam::Type) {
            Some(value) => {
                let types: BTreeSet<VariantType> = file::parse_variant_types(value)?
                    .into_iter()
                    .map(|t| match t {
                        VariantType::Snp => VariantType::Snv,
                        VariantType::Mnp => VariantType::Mnv,
                        t => t,
                    })
                    .collect();
                Some(types)
            }
            None => None,
        };

        let residual = ledger.fold(query);
        let index_query = SampleIndexQuery {
            regions,
            variant_types,
            study: study.name.clone(),
            samples: selection.samples,
            father_filters: selection.father_filters,
            mother_filters: selection.mother_filters,
            file_queries,
            annotation_query,
            mendelian_error_samples: selection.mendelian_error_samples,
            only_de_novo: selection.only_de_novo,
            operation: selection.operation,
            partial: selection.partial,
            complete_index,
        };
        Ok(Plan::Indexed {
            index_query,
            residual,
            coverage: ledger.summary(),
        })
    }

    fn parse_regions(&self, query: &Query, ledger: &mut CoverageLedger) -> Result<Vec<Region>> {
        let mut regions = Vec::new();
        if let Some(value) = query.get(QueryParam::Region) {
            regions.extend(parse_regions(value)?);
            ledger.exact(QueryParam::Region);
        }
        if let Some(value) = query.get(QueryParam::GeneRegions) {
            regions.extend(parse_regions(value)?);
            ledger.exact(QueryParam::GeneRegions);
            if query.contains(QueryParam::Gene) {
                // Gene regions stand in for the gene filter
                ledger.exact(QueryParam::Gene);
            }
        }
        Ok(merge_regions(regions))
    }

    fn select_by_genotype(
        &self,
        query: &Query,
        value: &str,
        study: &StudyMetadata,
        ledger: &mut CoverageLedger,
    ) -> Result<std::result::Result<SampleSelection, String>> {
        let (operation, filters) = parse_genotype_filter(value)?;

        let mut genotypes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut parents = BTreeMap::new();
        for (name, gts) in filters {
            let sample = self.metadata.sample(study.id, &name)?;
            if sample.family_index_status.is_ready() {
                let father = sample
                    .father
                    .map(|id| self.metadata.sample_name(study.id, id))
                    .transpose()?;
                let mother = sample
                    .mother
                    .map(|id| self.metadata.sample_name(study.id, id))
                    .transpose()?;
                if father.is_some() || mother.is_some() {
                    parents.insert(sample.name.clone(), (father, mother));
                }
            }
            genotypes.entry(sample.name).or_default().extend(gts);
        }

        let children = trio::find_children(&genotypes, operation, &parents)?;
        let parents_in_filter: BTreeSet<&String> = children
            .values()
            .flat_map(|(father, mother)| father.iter().chain(mother.iter()))
            .collect();

        let mut selection = SampleSelection {
            operation,
            ..Default::default()
        };
        let mut covered = !query.contains(QueryParam::Format);
        for (name, gts) in &genotypes {
            if operation == QueryOperation::And
                && parents_in_filter.contains(name)
                && !children.contains_key(name)
            {
                // Tested on the child's parents codes
                debug!(sample = %name, "discard parent");
                continue;
            }

            let all_valid = gts.iter().all(|gt| is_valid_index_genotype(gt));
            if trio::is_non_negated_filter(operation, gts)? && all_valid {
                selection.samples.insert(name.clone(), gts.clone());
                if operation == QueryOperation::And {
                    if let Some((father, mother)) = children.get(name) {
                        for (parent, filters) in [
                            (father, &mut selection.father_filters),
                            (mother, &mut selection.mother_filters),
                        ] {
                            if let Some(parent) = parent {
                                let filter = trio::build_parent_filter(&genotypes[parent]);
                                covered &= trio::is_fully_covered_parent_filter(&filter);
                                filters.insert(name.clone(), filter);
                            }
                        }
                    }
                }
            } else {
                debug!(sample = %name, "sample left to the residual query");
                selection.residual_only.push(name.clone());
                covered = false;
            }
        }

        if covered {
            ledger.exact(QueryParam::Genotype);
        } else {
            ledger.superset(
                QueryParam::Genotype,
                "genotypes outside the index, ambiguous parent codes or FORMAT filter",
            );
        }
        Ok(Ok(selection))
    }

    fn select_by_sample(
        &self,
        query: &Query,
        study: &StudyMetadata,
        main_genotypes: &[String],
        ledger: &mut CoverageLedger,
    ) -> Result<std::result::Result<SampleSelection, String>> {
        let (operation, names) = split_value(query.get(QueryParam::Sample).unwrap_or_default())?;
        let mut selection = SampleSelection {
            operation: operation.unwrap_or_default(),
            ..Default::default()
        };

        let mut any_negated = false;
        for name in names {
            if is_negated(&name) {
                any_negated = true;
                continue;
            }
            let sample = self.metadata.sample(study.id, &name)?;
            selection.samples.insert(sample.name, main_genotypes.to_vec());
        }

        if query.contains(QueryParam::Format) || any_negated {
            ledger.superset(QueryParam::Sample, "negated samples or FORMAT filter");
        } else {
            ledger.exact(QueryParam::Sample);
        }
        Ok(Ok(selection))
    }

    fn select_mendelian(
        &self,
        query: &Query,
        param: QueryParam,
        study: &StudyMetadata,
        main_genotypes: &[String],
        ledger: &mut CoverageLedger,
    ) -> Result<std::result::Result<SampleSelection, String>> {
        let only_de_novo = param == QueryParam::SampleDeNovo;
        let (operation, names) = split_value(query.get(param).unwrap_or_default())?;
        let mut selection = SampleSelection {
            operation: operation.unwrap_or_default(),
            only_de_novo,
            // Mendelian errors may come from reference genotypes, which have no bucket
            partial: !only_de_novo,
            ..Default::default()
        };

        let mut any_negated = false;
        for name in names {
            if is_negated(&name) {
                any_negated = true;
                continue;
            }
            let sample = self.metadata.sample(study.id, &name)?;
            if !sample.family_index_status.is_ready() {
                return Ok(Err(format!("family index of '{}' is not ready", sample.name)));
            }
            selection.samples.insert(sample.name.clone(), main_genotypes.to_vec());
            selection.mendelian_error_samples.insert(sample.name);
        }

        if only_de_novo && !any_negated {
            ledger.exact(param);
        } else {
            ledger.superset(param, "Mendelian errors are only partially indexed");
        }
        Ok(Ok(selection))
    }
}
