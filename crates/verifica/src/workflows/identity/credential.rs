//! INE credential parsing: date normalization, MRZ extraction, model
//! classification, and document-validation payload assembly.
//!
//! Everything here is local and total — the payload builder is the only
//! fallible piece, and it fails before any network call is made.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{DocumentSide, Subject};

/// Physical credential layout generation. Letter codes were reused across
/// document redesigns, so the effective model depends on the issuance year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialModel {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl CredentialModel {
    pub fn letter(&self) -> &'static str {
        match self {
            CredentialModel::A => "A",
            CredentialModel::B => "B",
            CredentialModel::C => "C",
            CredentialModel::D => "D",
            CredentialModel::E => "E",
            CredentialModel::F => "F",
            CredentialModel::G => "G",
            CredentialModel::H => "H",
        }
    }

    pub fn from_letter(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Some(CredentialModel::A),
            "B" => Some(CredentialModel::B),
            "C" => Some(CredentialModel::C),
            "D" => Some(CredentialModel::D),
            "E" => Some(CredentialModel::E),
            "F" => Some(CredentialModel::F),
            "G" => Some(CredentialModel::G),
            "H" => Some(CredentialModel::H),
            _ => None,
        }
    }

    /// Models whose validation payload is keyed by CIC + citizen identifier.
    fn uses_cic(&self) -> bool {
        matches!(
            self,
            CredentialModel::E | CredentialModel::F | CredentialModel::G | CredentialModel::H
        )
    }
}

/// Resolve the effective model from the printed letter and issuance year.
///
/// The 2014 and 2019 redesigns reused the A/B/C letter codes, so a printed
/// A/B/C on a 2019+ credential is actually the H layout, and E for 2014-2018.
pub fn classify_model(printed: CredentialModel, issuance_year: i32) -> CredentialModel {
    let reused_letter = matches!(
        printed,
        CredentialModel::A | CredentialModel::B | CredentialModel::C
    );
    if !reused_letter {
        return printed;
    }

    if issuance_year >= 2019 {
        CredentialModel::H
    } else if issuance_year >= 2014 {
        CredentialModel::E
    } else {
        printed
    }
}

/// Normalize `DD/MM/YYYY` or `DD-MM-YYYY` into `YYYY-MM-DD`. Anything else
/// passes through unchanged; this never fails.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    let separator = match (trimmed.contains('/'), trimmed.contains('-')) {
        (true, false) => '/',
        (false, true) => '-',
        _ => return raw.to_string(),
    };

    let parts: Vec<&str> = trimmed.split(separator).collect();
    if parts.len() != 3 {
        return raw.to_string();
    }

    let (day, month, year) = (parts[0], parts[1], parts[2]);
    let numeric = |value: &str| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit());
    if day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return raw.to_string();
    }
    if !numeric(day) || !numeric(month) || !numeric(year) {
        return raw.to_string();
    }

    format!("{year}-{month}-{day}")
}

/// Fields recovered from the machine-readable zone on the credential back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrzFields {
    pub cic: String,
    pub citizen_id: String,
    pub ocr_number: String,
}

/// Locate the `IDMEX<digits><filler><digits>` pattern and split it into CIC,
/// citizen identifier, and the full check-digit (OCR) number.
///
/// Total: any input without a well-formed pattern yields `None`.
pub fn extract_mrz(raw: &str) -> Option<MrzFields> {
    let start = raw.find("IDMEX")?;
    let tail = &raw[start + "IDMEX".len()..];

    let mut chars = tail.char_indices().peekable();

    let mut cic = String::new();
    while let Some((_, c)) = chars.peek().copied() {
        if c.is_ascii_digit() && cic.len() < 9 {
            cic.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if cic.is_empty() {
        return None;
    }

    // Skip the filler run between the two digit groups.
    let mut saw_filler = false;
    while let Some((_, c)) = chars.peek().copied() {
        if c.is_ascii_digit() {
            break;
        }
        if c == '<' {
            saw_filler = true;
            chars.next();
        } else {
            return None;
        }
    }
    if !saw_filler {
        return None;
    }

    let mut ocr_number = String::new();
    for (_, c) in chars {
        if c.is_ascii_digit() {
            ocr_number.push(c);
        } else {
            break;
        }
    }
    if ocr_number.len() < 9 {
        return None;
    }

    let citizen_id = ocr_number[ocr_number.len() - 9..].to_string();

    Some(MrzFields {
        cic,
        citizen_id,
        ocr_number,
    })
}

/// Validation payload in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub credential_type: String,
    pub clave_de_elector: String,
    pub numero_de_emision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identificador_del_ciudadano: Option<String>,
}

/// Local validation failures raised before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credential model could not be determined")]
    UnknownModel,
    #[error("clave de elector is missing")]
    MissingElectorKey,
    #[error("model {model} requires a 13-digit OCR number")]
    MissingOcr { model: &'static str },
    #[error("model {model} requires CIC and citizen identifier")]
    MissingCic { model: &'static str },
}

/// Assemble the document-validation payload for the subject's effective model.
///
/// Model C (and the other pre-redesign layouts) validates by a 13-digit OCR
/// number; E/F/G/H validate by CIC + citizen identifier, recoverable from a
/// raw MRZ string when the structured fields are absent.
pub fn document_payload(subject: &Subject) -> Result<DocumentPayload, CredentialError> {
    let printed = subject.credential_model.ok_or(CredentialError::UnknownModel)?;
    let model = match subject.issuance_year {
        Some(year) => classify_model(printed, year),
        None => printed,
    };

    let elector_key = subject
        .elector_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or(CredentialError::MissingElectorKey)?
        .to_string();

    let emission_number = subject.emission_number.clone().unwrap_or_default();

    if model.uses_cic() {
        let recovered = subject.mrz.as_deref().and_then(extract_mrz);

        let cic = subject
            .cic
            .clone()
            .or_else(|| recovered.as_ref().map(|mrz| mrz.cic.clone()));
        let citizen_id = subject
            .citizen_id
            .clone()
            .or_else(|| recovered.as_ref().map(|mrz| mrz.citizen_id.clone()));
        let ocr = subject
            .ocr_number
            .clone()
            .or_else(|| recovered.map(|mrz| mrz.ocr_number));

        match (cic, citizen_id) {
            (Some(cic), Some(citizen_id)) => Ok(DocumentPayload {
                credential_type: model.letter().to_string(),
                clave_de_elector: elector_key,
                numero_de_emision: emission_number,
                ocr,
                cic: Some(cic),
                identificador_del_ciudadano: Some(citizen_id),
            }),
            _ => Err(CredentialError::MissingCic {
                model: model.letter(),
            }),
        }
    } else {
        let ocr = subject
            .ocr_number
            .as_deref()
            .filter(|ocr| ocr.len() == 13 && ocr.chars().all(|c| c.is_ascii_digit()))
            .ok_or(CredentialError::MissingOcr {
                model: model.letter(),
            })?
            .to_string();

        Ok(DocumentPayload {
            credential_type: model.letter().to_string(),
            clave_de_elector: elector_key,
            numero_de_emision: emission_number,
            ocr: Some(ocr),
            cic: None,
            identificador_del_ciudadano: None,
        })
    }
}

/// Fields extracted by the provider's OCR for one credential side.
/// Ephemeral: folded into the subject working record, never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialFields {
    pub name: Option<String>,
    pub id_number: Option<String>,
    pub address: Option<String>,
    pub elector_key: Option<String>,
    pub emission_number: Option<String>,
    pub issuance_year: Option<i32>,
    pub model: Option<CredentialModel>,
    pub mrz: Option<String>,
    pub cic: Option<String>,
    pub citizen_id: Option<String>,
    pub ocr_number: Option<String>,
}

/// Interpret the provider's raw `extract-ocr` response for one side.
///
/// Missing or empty keys stay `None`; the merge step never overwrites a
/// populated subject field with emptiness.
pub fn fields_from_response(side: DocumentSide, response: &Value) -> CredentialFields {
    let text = |key: &str| {
        response
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut fields = CredentialFields::default();
    match side {
        DocumentSide::Front => {
            fields.name = text("nombre");
            fields.id_number = text("curp");
            fields.address = text("domicilio");
            fields.elector_key = text("clave_de_elector");
            fields.emission_number = text("numero_de_emision");
            fields.issuance_year = response
                .get("anio_de_emision")
                .and_then(Value::as_i64)
                .map(|year| year as i32)
                .or_else(|| text("anio_de_emision").and_then(|raw| raw.parse().ok()));
            fields.model = text("modelo").and_then(|raw| CredentialModel::from_letter(&raw));
        }
        DocumentSide::Back => {
            fields.mrz = text("mrz");
            fields.cic = text("cic");
            fields.citizen_id = text("identificador_del_ciudadano");
            fields.ocr_number = text("ocr");
            if let Some(mrz) = fields.mrz.as_deref().and_then(extract_mrz) {
                fields.cic = fields.cic.or(Some(mrz.cic));
                fields.citizen_id = fields.citizen_id.or(Some(mrz.citizen_id));
                fields.ocr_number = fields.ocr_number.or(Some(mrz.ocr_number));
            }
        }
    }

    fields
}
