#[cfg(test)]
mod callback_tests {
    use payment_service::error::PaymentError;
    use payment_service::payments::phone::normalize_phone;
    use payment_service::payments::types::{StkCallbackEnvelope, StkQueryResponse};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn callback_payload(result_code: i64, with_metadata: bool) -> serde_json::Value {
        let mut stk = json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResultCode": result_code,
            "ResultDesc": if result_code == 0 {
                "The service request is processed successfully."
            } else {
                "Request cancelled by user"
            },
        });

        if with_metadata {
            stk["CallbackMetadata"] = json!({
                "Item": [
                    {"Name": "Amount", "Value": 500.00},
                    {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                    {"Name": "TransactionDate", "Value": 20191219102115u64},
                    {"Name": "PhoneNumber", "Value": 254712345678u64}
                ]
            });
        }

        json!({ "Body": { "stkCallback": stk } })
    }

    #[test]
    fn test_success_callback_round_trip() {
        let payload = callback_payload(0, true);
        let envelope: StkCallbackEnvelope = serde_json::from_value(payload).unwrap();
        let callback = envelope.body.stk_callback;

        assert!(callback.is_success());
        assert_eq!(callback.merchant_request_id, "29115-34620561-1");
        assert_eq!(callback.receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(callback.metadata_amount(), Some(Decimal::new(500, 0)));
    }

    #[test]
    fn test_cancellation_callback_has_no_metadata() {
        let payload = callback_payload(1032, false);
        let envelope: StkCallbackEnvelope = serde_json::from_value(payload).unwrap();
        let callback = envelope.body.stk_callback;

        assert!(!callback.is_success());
        assert!(callback.callback_metadata.is_none());
        assert!(callback.receipt_number().is_none());
    }

    #[test]
    fn test_malformed_callback_is_rejected_by_parser() {
        let payload = json!({ "Body": { "stkCallback": { "ResultCode": "not-a-number" } } });
        let parsed: Result<StkCallbackEnvelope, _> = serde_json::from_value(payload);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_query_response_with_pending_transaction() {
        // The status query omits ResultCode while the push is in flight
        let payload = json!({
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successfully",
            "MerchantRequestID": "22205-34066-1",
            "CheckoutRequestID": "ws_CO_13012021093521236557"
        });

        let response: StkQueryResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(response.response_code, "0");
        assert!(response.result_code.is_none());
    }

    #[test]
    fn test_phone_normalization_vectors() {
        for raw in ["0712345678", "+254712345678", "254712345678", "712345678"] {
            assert_eq!(
                normalize_phone(raw, "254").unwrap(),
                "254712345678",
                "failed for input {raw}"
            );
        }
    }

    #[test]
    fn test_phone_normalization_rejects_garbage() {
        let err = normalize_phone("call me", "254").unwrap_err();
        assert!(matches!(err, PaymentError::Validation { .. }));
    }
}
