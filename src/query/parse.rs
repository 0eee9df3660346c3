use super::{Query, QueryParam};
use crate::types::QueryOperation;
use crate::{Error, Result};

const OPERATOR_CHARS: [char; 5] = ['<', '>', '=', '!', '~'];

/// Split a multi valued filter, returning the operator joining its terms.
/// Mixing `;` and `,` is an error. A single term has no operator.
pub fn split_value(value: &str) -> Result<(Option<QueryOperation>, Vec<String>)> {
    let has_and = value.contains(QueryOperation::AND_SEPARATOR);
    let has_or = value.contains(QueryOperation::OR_SEPARATOR);
    let op = match (has_and, has_or) {
        (true, true) => {
            return Err(Error::InvalidQuery(format!(
                "can not mix AND (;) and OR (,) in '{}'",
                value
            )));
        }
        (true, false) => Some(QueryOperation::And),
        (false, true) => Some(QueryOperation::Or),
        (false, false) => None,
    };
    let terms = value
        .split([QueryOperation::AND_SEPARATOR, QueryOperation::OR_SEPARATOR])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Ok((op, terms))
}

/// Split `key<op>value`. The key ends at the first operator character and the operator
/// is the run of operator characters after it. Without operator the whole term is the value.
pub fn split_operator(term: &str) -> (String, String, String) {
    let term = term.trim();
    let Some(start) = term.find(OPERATOR_CHARS) else {
        return (String::new(), String::new(), term.to_string());
    };
    let rest = &term[start..];
    let len = rest
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(rest.len());
    (
        term[..start].trim().to_string(),
        rest[..len].to_string(),
        rest[len..].trim().to_string(),
    )
}

/// Parse `s1:0/1,1/1;s2:!0/0`.
///
/// `;` between samples means AND and `,` between samples means OR. A single sample is
/// an AND filter. Sample order of the input is preserved.
pub fn parse_genotype_filter(value: &str) -> Result<(QueryOperation, Vec<(String, Vec<String>)>)> {
    let mut samples: Vec<(String, Vec<String>)> = Vec::new();
    let mut op = None;

    for (i, group) in value.split(QueryOperation::AND_SEPARATOR).enumerate() {
        let mut samples_in_group = 0;
        for token in group.split(QueryOperation::OR_SEPARATOR).map(str::trim) {
            if token.is_empty() {
                continue;
            }
            match token.split_once(':') {
                Some((sample, gt)) => {
                    let sample = sample.trim();
                    if sample.is_empty() {
                        return Err(Error::InvalidQuery(format!(
                            "missing sample in genotype filter '{}'",
                            value
                        )));
                    }
                    samples_in_group += 1;
                    match samples.iter_mut().find(|(s, _)| s == sample) {
                        Some((_, gts)) => gts.push(gt.trim().to_string()),
                        None => samples.push((sample.to_string(), vec![gt.trim().to_string()])),
                    }
                }
                None => match samples.last_mut() {
                    Some((_, gts)) if samples_in_group > 0 => gts.push(token.to_string()),
                    _ => {
                        return Err(Error::InvalidQuery(format!(
                            "genotype '{}' without sample",
                            token
                        )));
                    }
                },
            }
        }
        if i > 0 {
            op = Some(QueryOperation::And);
        }
        if samples_in_group > 1 {
            if i > 0 || value.contains(QueryOperation::AND_SEPARATOR) {
                return Err(Error::InvalidQuery(format!(
                    "can not mix AND (;) and OR (,) between samples in '{}'",
                    value
                )));
            }
            op = Some(QueryOperation::Or);
        }
    }

    if samples.is_empty() {
        return Err(Error::InvalidQuery("empty genotype filter".to_string()));
    }
    Ok((op.unwrap_or(QueryOperation::And), samples))
}

/// Parse per sample or per file filters such as `s1:DP>10,GQ>20;s2:DP>5`.
/// Terms without a `name:` prefix belong to the previous name, or to every name
/// (empty key) when they come first.
pub fn parse_keyed_filters(value: &str) -> Vec<(String, Vec<String>)> {
    let mut entries: Vec<(String, Vec<String>)> = Vec::new();
    for token in value
        .split([QueryOperation::AND_SEPARATOR, QueryOperation::OR_SEPARATOR])
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let keyed = token
            .split_once(':')
            .filter(|(name, _)| !name.contains(OPERATOR_CHARS));
        match keyed {
            Some((name, filter)) => entries.push((name.trim().to_string(), vec![filter.trim().to_string()])),
            None => match entries.last_mut() {
                Some((_, filters)) => filters.push(token.to_string()),
                None => entries.push((String::new(), vec![token.to_string()])),
            },
        }
    }
    entries
}

/// Cross references and genes requested by ID, XREF and GENE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Xrefs {
    pub genes: Vec<String>,
    pub ids: Vec<String>,
    pub variants: Vec<String>,
    pub other: Vec<String>,
}

fn is_variant_id(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    parts.len() == 4 && parts[1].parse::<u64>().is_ok()
}

fn is_rs_id(value: &str) -> bool {
    value
        .strip_prefix("rs")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn is_other_xref(value: &str) -> bool {
    value.contains(':')
        || ["COSM", "COSV", "RCV", "VCV", "ENST", "ENSP"]
            .iter()
            .any(|prefix| value.starts_with(prefix))
}

pub fn parse_xrefs(query: &Query) -> Result<Xrefs> {
    let mut xrefs = Xrefs::default();
    for param in [QueryParam::Id, QueryParam::Xref] {
        if let Some(value) = query.get(param) {
            for term in split_value(value)?.1 {
                if is_variant_id(&term) {
                    xrefs.variants.push(term);
                } else if is_rs_id(&term) {
                    xrefs.ids.push(term);
                } else if is_other_xref(&term) {
                    xrefs.other.push(term);
                } else {
                    xrefs.genes.push(term);
                }
            }
        }
    }
    if let Some(value) = query.get(QueryParam::Gene) {
        xrefs.genes.extend(split_value(value)?.1);
    }
    Ok(xrefs)
}

const SO_ACCESSIONS: &[(u32, &str)] = &[
    (1893, "transcript_ablation"),
    (1574, "splice_acceptor_variant"),
    (1575, "splice_donor_variant"),
    (1587, "stop_gained"),
    (1589, "frameshift_variant"),
    (1578, "stop_lost"),
    (2012, "start_lost"),
    (1889, "transcript_amplification"),
    (1821, "inframe_insertion"),
    (1822, "inframe_deletion"),
    (1583, "missense_variant"),
    (1582, "initiator_codon_variant"),
    (1630, "splice_region_variant"),
    (1626, "incomplete_terminal_codon_variant"),
    (1567, "stop_retained_variant"),
    (1819, "synonymous_variant"),
    (1580, "coding_sequence_variant"),
    (1620, "mature_miRNA_variant"),
    (1623, "5_prime_UTR_variant"),
    (1624, "3_prime_UTR_variant"),
    (1792, "non_coding_transcript_exon_variant"),
    (1627, "intron_variant"),
    (1621, "NMD_transcript_variant"),
    (1619, "non_coding_transcript_variant"),
    (1631, "upstream_gene_variant"),
    (1632, "downstream_gene_variant"),
    (1782, "TF_binding_site_variant"),
    (1566, "regulatory_region_variant"),
    (1628, "intergenic_variant"),
    (1818, "protein_altering_variant"),
    (1906, "feature_truncation"),
    (1907, "feature_elongation"),
    (2019, "start_retained_variant"),
    (1787, "splice_donor_5th_base_variant"),
    (2169, "splice_polypyrimidine_tract_variant"),
    (2170, "splice_donor_region_variant"),
    (1895, "TFBS_ablation"),
    (1892, "TFBS_amplification"),
    (1894, "regulatory_region_ablation"),
    (1891, "regulatory_region_amplification"),
];

/// Resolve a consequence type given as SO term name or `SO:` accession. Unknown names are
/// rejected.
pub fn parse_consequence_type(value: &str) -> Result<String> {
    let value = value.trim();
    let accession = value
        .strip_prefix("SO:")
        .or_else(|| value.strip_prefix("so:"));
    match accession {
        Some(number) => {
            let number: u32 = number
                .parse()
                .map_err(|_| Error::InvalidQuery(format!("invalid SO accession: {}", value)))?;
            SO_ACCESSIONS
                .iter()
                .find(|(acc, _)| *acc == number)
                .map(|(_, term)| term.to_string())
                .ok_or_else(|| Error::InvalidQuery(format!("unknown SO accession: {}", value)))
        }
        None => SO_ACCESSIONS
            .iter()
            .find(|(_, term)| *term == value)
            .map(|(_, term)| term.to_string())
            .ok_or_else(|| Error::InvalidQuery(format!("unknown consequence type: {}", value))),
    }
}
