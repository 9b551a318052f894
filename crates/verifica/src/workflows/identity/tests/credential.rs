use super::common::model_h_subject;
use crate::workflows::identity::credential::{
    classify_model, document_payload, extract_mrz, normalize_date, CredentialError,
    CredentialModel,
};

mod classification {
    use super::*;

    #[test]
    fn reused_letters_from_2019_onward_are_model_h() {
        for printed in [CredentialModel::A, CredentialModel::B, CredentialModel::C] {
            assert_eq!(classify_model(printed, 2019), CredentialModel::H);
            assert_eq!(classify_model(printed, 2024), CredentialModel::H);
        }
    }

    #[test]
    fn reused_letters_between_2014_and_2018_are_model_e() {
        for printed in [CredentialModel::A, CredentialModel::B, CredentialModel::C] {
            assert_eq!(classify_model(printed, 2014), CredentialModel::E);
            assert_eq!(classify_model(printed, 2018), CredentialModel::E);
        }
    }

    #[test]
    fn pre_2014_letters_stay_as_printed() {
        assert_eq!(classify_model(CredentialModel::A, 2013), CredentialModel::A);
        assert_eq!(classify_model(CredentialModel::C, 2009), CredentialModel::C);
    }

    #[test]
    fn non_reused_letters_ignore_the_year() {
        assert_eq!(classify_model(CredentialModel::D, 2022), CredentialModel::D);
        assert_eq!(classify_model(CredentialModel::G, 2016), CredentialModel::G);
    }
}

mod dates {
    use super::normalize_date;

    #[test]
    fn slash_separated_day_first_becomes_iso() {
        assert_eq!(normalize_date("05/03/1990"), "1990-03-05");
    }

    #[test]
    fn dash_separated_day_first_becomes_iso() {
        assert_eq!(normalize_date("31-12-2001"), "2001-12-31");
    }

    #[test]
    fn already_iso_input_is_unchanged() {
        assert_eq!(normalize_date("1990-03-05"), "1990-03-05");
    }

    #[test]
    fn garbage_passes_through_without_panicking() {
        assert_eq!(normalize_date("not a date"), "not a date");
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("5/3/90"), "5/3/90");
    }
}

mod mrz {
    use super::extract_mrz;

    #[test]
    fn well_formed_zone_splits_into_cic_identifier_and_ocr() {
        let fields =
            extract_mrz("IDMEX123456789<<0123456789012<<PEREZ").expect("pattern present");
        assert_eq!(fields.cic, "123456789");
        assert_eq!(fields.ocr_number, "0123456789012");
        assert_eq!(fields.citizen_id, "456789012");
    }

    #[test]
    fn citizen_identifier_is_last_nine_of_second_run() {
        let fields = extract_mrz("IDMEX12345<<<987654321").expect("pattern present");
        assert_eq!(fields.cic, "12345");
        assert_eq!(fields.citizen_id, "987654321");
    }

    #[test]
    fn missing_pattern_yields_none() {
        assert!(extract_mrz("P<MEXPEREZ<<JUAN").is_none());
        assert!(extract_mrz("").is_none());
        assert!(extract_mrz("IDMEX<<<123").is_none());
    }

    #[test]
    fn short_second_run_is_rejected() {
        assert!(extract_mrz("IDMEX12345<<678").is_none());
    }
}

mod payload {
    use super::*;

    #[test]
    fn model_c_requires_thirteen_digit_ocr() {
        let mut subject = model_h_subject();
        subject.credential_model = Some(CredentialModel::C);
        subject.issuance_year = Some(2010);
        subject.ocr_number = Some("12345".to_string());

        let err = document_payload(&subject).expect_err("short ocr must be rejected");
        assert!(matches!(err, CredentialError::MissingOcr { model: "C" }));
    }

    #[test]
    fn model_c_payload_carries_ocr_and_no_cic() {
        let mut subject = model_h_subject();
        subject.credential_model = Some(CredentialModel::C);
        subject.issuance_year = Some(2010);

        let payload = document_payload(&subject).expect("payload builds");
        assert_eq!(payload.credential_type, "C");
        assert_eq!(payload.ocr.as_deref(), Some("1234567890123"));
        assert!(payload.cic.is_none());
        assert!(payload.identificador_del_ciudadano.is_none());
    }

    #[test]
    fn model_h_payload_carries_cic_and_identifier() {
        let subject = model_h_subject();

        let payload = document_payload(&subject).expect("payload builds");
        assert_eq!(payload.credential_type, "H");
        assert_eq!(payload.cic.as_deref(), Some("123456789"));
        assert_eq!(payload.identificador_del_ciudadano.as_deref(), Some("987654321"));
    }

    #[test]
    fn cic_is_recovered_from_mrz_when_structured_fields_are_missing() {
        let mut subject = model_h_subject();
        subject.cic = None;
        subject.citizen_id = None;
        subject.ocr_number = None;
        subject.mrz = Some("IDMEX987654321<<1122334455667".to_string());

        let payload = document_payload(&subject).expect("mrz recovery succeeds");
        assert_eq!(payload.cic.as_deref(), Some("987654321"));
        assert_eq!(payload.identificador_del_ciudadano.as_deref(), Some("334455667"));
        assert_eq!(payload.ocr.as_deref(), Some("1122334455667"));
    }

    #[test]
    fn missing_cic_without_mrz_is_a_local_error() {
        let mut subject = model_h_subject();
        subject.cic = None;
        subject.citizen_id = None;
        subject.mrz = None;

        let err = document_payload(&subject).expect_err("cic required for model H");
        assert!(matches!(err, CredentialError::MissingCic { model: "H" }));
    }

    #[test]
    fn missing_elector_key_is_a_local_error() {
        let mut subject = model_h_subject();
        subject.elector_key = None;

        let err = document_payload(&subject).expect_err("elector key always required");
        assert!(matches!(err, CredentialError::MissingElectorKey));
    }

    #[test]
    fn unknown_model_is_a_local_error() {
        let mut subject = model_h_subject();
        subject.credential_model = None;

        let err = document_payload(&subject).expect_err("model must be known");
        assert!(matches!(err, CredentialError::UnknownModel));
    }
}
