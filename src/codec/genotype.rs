//! Genotype codes.
//!
//! Every genotype string maps to exactly one of [`NUM_CODES`] codes. Codes that group
//! several distinct genotypes (multi-allelic, polyploid, partially missing, unparseable)
//! are ambiguous: a filter resolving to one of them can never be proven exact.
//!
//! The parents column of the sample index stores, for every variant of a child, the
//! father code in the high nibble and the mother code in the low nibble.

pub const NUM_CODES: usize = 16;

pub const HOM_REF_UNPHASED: u8 = 0;
pub const HET_REF_UNPHASED: u8 = 1;
pub const HOM_ALT_UNPHASED: u8 = 2;
pub const HOM_REF_PHASED: u8 = 3;
pub const HET_REF_01_PHASED: u8 = 4;
pub const HET_REF_10_PHASED: u8 = 5;
pub const HOM_ALT_PHASED: u8 = 6;
pub const HEMI_REF: u8 = 7;
pub const HEMI_ALT: u8 = 8;
pub const MULTI_HOM: u8 = 9;
pub const MULTI_HET: u8 = 10;
pub const MISSING_HOM: u8 = 11;
pub const MISSING_HEMI: u8 = 12;
pub const POLYPLOID: u8 = 13;
pub const PARTIAL_MISSING: u8 = 14;
pub const UNKNOWN: u8 = 15;

const PARENT_SHIFT: u8 = 4;
const PARENT_MASK: u8 = 0x0F;

pub const NEGATION: char = '!';

/// Placeholders used by variant stores for genotypes without a call
const UNKNOWN_GENOTYPES: [&str; 2] = ["?/?", "NA"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allele {
    Missing,
    Index(u32),
}

fn parse_alleles(gt: &str) -> Option<(Vec<Allele>, bool)> {
    if gt.is_empty() {
        return None;
    }
    let phased = gt.contains('|');
    let mut alleles = Vec::with_capacity(2);
    for token in gt.split(['/', '|']) {
        let allele = match token {
            "." => Allele::Missing,
            t if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) => {
                Allele::Index(t.parse().ok()?)
            }
            _ => return None,
        };
        alleles.push(allele);
    }
    Some((alleles, phased))
}

/// Encode a genotype string. Never fails: unparseable input maps to [`UNKNOWN`].
pub fn encode(gt: &str) -> u8 {
    let Some((alleles, phased)) = parse_alleles(gt.trim()) else {
        return UNKNOWN;
    };

    match alleles.as_slice() {
        [Allele::Missing] => MISSING_HEMI,
        [Allele::Index(0)] => HEMI_REF,
        [Allele::Index(1)] => HEMI_ALT,
        [Allele::Index(_)] => MULTI_HOM,
        [Allele::Missing, Allele::Missing] => MISSING_HOM,
        [Allele::Missing, _] | [_, Allele::Missing] => PARTIAL_MISSING,
        [Allele::Index(a), Allele::Index(b)] => match (*a, *b, phased) {
            (0, 0, false) => HOM_REF_UNPHASED,
            (0, 0, true) => HOM_REF_PHASED,
            (0, 1, false) | (1, 0, false) => HET_REF_UNPHASED,
            (0, 1, true) => HET_REF_01_PHASED,
            (1, 0, true) => HET_REF_10_PHASED,
            (1, 1, false) => HOM_ALT_UNPHASED,
            (1, 1, true) => HOM_ALT_PHASED,
            (a, b, _) if a == b => MULTI_HOM,
            _ => MULTI_HET,
        },
        _ => POLYPLOID,
    }
}

pub fn is_ambiguous_code(code: u8) -> bool {
    matches!(
        code,
        MULTI_HOM | MULTI_HET | POLYPLOID | PARTIAL_MISSING | UNKNOWN
    )
}

/// Canonical genotype of a non ambiguous code
pub fn canonical_genotype(code: u8) -> Option<&'static str> {
    let gt = match code {
        HOM_REF_UNPHASED => "0/0",
        HET_REF_UNPHASED => "0/1",
        HOM_ALT_UNPHASED => "1/1",
        HOM_REF_PHASED => "0|0",
        HET_REF_01_PHASED => "0|1",
        HET_REF_10_PHASED => "1|0",
        HOM_ALT_PHASED => "1|1",
        HEMI_REF => "0",
        HEMI_ALT => "1",
        MISSING_HOM => "./.",
        MISSING_HEMI => ".",
        _ => return None,
    };
    Some(gt)
}

/// Whether `gt` is matched by the set of codes marked in `filter`
pub fn filter_accepts(filter: &[bool; NUM_CODES], gt: &str) -> bool {
    filter[encode(gt) as usize]
}

pub fn encode_parents(father: Option<&str>, mother: Option<&str>) -> u8 {
    let father = father.map(encode).unwrap_or(UNKNOWN);
    let mother = mother.map(encode).unwrap_or(UNKNOWN);
    (father << PARENT_SHIFT) | (mother & PARENT_MASK)
}

pub fn father_code(parents: u8) -> u8 {
    parents >> PARENT_SHIFT
}

pub fn mother_code(parents: u8) -> u8 {
    parents & PARENT_MASK
}

pub fn is_negated(value: &str) -> bool {
    value.starts_with(NEGATION)
}

pub fn remove_negation(value: &str) -> &str {
    value.strip_prefix(NEGATION).unwrap_or(value)
}

pub fn is_hom_ref(gt: &str) -> bool {
    matches!(encode(gt), HOM_REF_UNPHASED | HOM_REF_PHASED | HEMI_REF)
}

pub fn is_missing(gt: &str) -> bool {
    matches!(encode(gt), MISSING_HOM | MISSING_HEMI)
}

/// Genotypes with a bucket in the sample index. Reference and missing calls are not indexed.
pub fn is_valid_index_genotype(gt: &str) -> bool {
    let gt = remove_negation(gt.trim());
    !gt.is_empty() && !UNKNOWN_GENOTYPES.contains(&gt) && !is_hom_ref(gt) && !is_missing(gt)
}

/// Genotypes carrying the main alternate allele
pub fn is_main_alt(gt: &str) -> bool {
    match parse_alleles(remove_negation(gt.trim())) {
        Some((alleles, _)) => alleles.contains(&Allele::Index(1)),
        None => false,
    }
}
