//! QR payload encoding and decoding.
//!
//! Payloads are deep links under the `handlepay://` scheme, with a path
//! selecting the payload type and query parameters carrying the fields.
//! Decoding is total over well-formed links: foreign paths under the scheme
//! decode to [`QrPayload::Unknown`] instead of failing, so scanners stay
//! forward-compatible with payload types added later.

use url::form_urlencoded;

const SCHEME_PREFIX: &str = "handlepay://";
const REQUEST_PATH: &str = "request";
const HANDLE_PATH: &str = "handle";

/// Fields of a payment-request payload. All optional on the wire; absent
/// fields decode to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QrPaymentRequest {
    pub requester: String,
    pub requester_handle: String,
    pub amount_display: String,
    pub note: String,
    pub request_id: String,
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    PaymentRequest(QrPaymentRequest),
    Handle(String),
    /// A well-formed link under our scheme with a path this version does
    /// not understand.
    Unknown,
}

/// The input is not a link under our scheme.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a recognizable payment link")]
pub struct QrError;

/// Encodes a payment request as a shareable link.
pub fn encode_request(request: &QrPaymentRequest) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("requester", &request.requester)
        .append_pair("requesterHandle", &request.requester_handle)
        .append_pair("amount", &request.amount_display)
        .append_pair("note", &request.note)
        .append_pair("requestId", &request.request_id);
    format!("{SCHEME_PREFIX}{REQUEST_PATH}?{}", query.finish())
}

/// Encodes a bare handle as a shareable link.
pub fn encode_handle(handle: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("handle", handle);
    format!("{SCHEME_PREFIX}{HANDLE_PATH}?{}", query.finish())
}

/// Decodes a scanned string.
pub fn decode(input: &str) -> Result<QrPayload, QrError> {
    let rest = input.strip_prefix(SCHEME_PREFIX).ok_or(QrError)?;
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    match path {
        REQUEST_PATH => {
            let mut request = QrPaymentRequest::default();
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "requester" => request.requester = value.into_owned(),
                    "requesterHandle" => request.requester_handle = value.into_owned(),
                    "amount" => request.amount_display = value.into_owned(),
                    "note" => request.note = value.into_owned(),
                    "requestId" => request.request_id = value.into_owned(),
                    _ => {}
                }
            }
            Ok(QrPayload::PaymentRequest(request))
        }
        HANDLE_PATH => {
            let handle = form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "handle")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            Ok(QrPayload::Handle(handle))
        }
        _ => Ok(QrPayload::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let request = QrPaymentRequest {
            requester: "0x000000000000000000000000000000000000dEaD".into(),
            requester_handle: "alice".into(),
            amount_display: "12.5".into(),
            note: "lunch & drinks".into(),
            request_id: "0x0101".into(),
        };
        let encoded = encode_request(&request);
        assert!(encoded.starts_with("handlepay://request?"));
        assert_eq!(decode(&encoded).unwrap(), QrPayload::PaymentRequest(request));
    }

    #[test]
    fn empty_note_survives_round_trip() {
        let request = QrPaymentRequest {
            requester_handle: "bob".into(),
            amount_display: "1".into(),
            ..QrPaymentRequest::default()
        };
        let decoded = decode(&encode_request(&request)).unwrap();
        assert_eq!(decoded, QrPayload::PaymentRequest(request));
    }

    #[test]
    fn handle_round_trip_escapes_special_characters() {
        let encoded = encode_handle("café crowd");
        assert!(encoded.starts_with("handlepay://handle?"));
        assert_eq!(decode(&encoded).unwrap(), QrPayload::Handle("café crowd".into()));
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        assert_eq!(decode("https://example.com/request?amount=1"), Err(QrError));
        assert_eq!(decode("handlepay:/request"), Err(QrError));
        assert_eq!(decode(""), Err(QrError));
    }

    #[test]
    fn unknown_path_decodes_to_unknown() {
        assert_eq!(
            decode("handlepay://subscription?plan=pro").unwrap(),
            QrPayload::Unknown
        );
        assert_eq!(decode("handlepay://").unwrap(), QrPayload::Unknown);
    }

    #[test]
    fn missing_fields_decode_to_empty_strings() {
        let decoded = decode("handlepay://request?amount=3").unwrap();
        let QrPayload::PaymentRequest(request) = decoded else {
            panic!("expected a payment request");
        };
        assert_eq!(request.amount_display, "3");
        assert!(request.requester.is_empty());
        assert!(request.request_id.is_empty());
    }
}
