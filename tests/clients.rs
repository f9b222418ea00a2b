use medcode::traits::{
    CompletionClient, CompletionRequest, EmbeddingClient, ResponseFormat, TerminologyClient,
};
use medcode::{ClinicalTablesClient, OpenAiClient, RxNavClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new("test-key".to_string())
        .with_base_url(server.uri())
        .with_embedding_model("text-embedding-3-small".to_string(), 3)
}

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = openai(&server)
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn embeddings_with_wrong_count_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let result = openai(&server)
        .embed(&["a".to_string(), "b".to_string()])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn chat_completion_sends_prompts_and_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"code\": \"I10\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompletionRequest::new("system", "hypertension", "gpt-4o-mini", 0.1)
        .with_response_format(ResponseFormat::JsonObject);
    let content = openai(&server).complete(&request).await.unwrap();
    assert_eq!(content, "{\"code\": \"I10\"}");

    let received = server.received_requests().await.unwrap();
    let body = received[0].body_json::<serde_json::Value>().unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "hypertension");
}

#[tokio::test]
async fn chat_completion_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let request = CompletionRequest::new("system", "user", "gpt-4o-mini", 0.1);
    let err = openai(&server).complete(&request).await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn rxnav_search_parses_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/approximateTerm.json"))
        .and(query_param("term", "lisinopril 10mg"))
        .and(query_param("maxEntries", "5"))
        .and(query_param("option", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "approximateGroup": {
                "inputTerm": null,
                "candidate": [
                    {
                        "rxcui": "314076", "score": "91.2", "rank": "1",
                        "name": "lisinopril 10 MG Oral Tablet", "source": "RXNORM"
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = RxNavClient::new(server.uri())
        .search("lisinopril 10mg", 5)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].identifier.as_deref(), Some("314076"));
    assert_eq!(rows[0].score, Some(91.2));
}

#[tokio::test]
async fn rxnav_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/approximateTerm.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(RxNavClient::new(server.uri()).search("aspirin", 5).await.is_err());
}

#[tokio::test]
async fn clinical_tables_search_parses_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/icd10cm/v3/search"))
        .and(query_param("terms", "essential hypertension"))
        .and(query_param("df", "code,name"))
        .and(query_param("sf", "name"))
        .and(query_param("maxList", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            1,
            ["I10"],
            null,
            [["I10", "Essential (primary) hypertension"]]
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = ClinicalTablesClient::new(format!("{}/icd10cm/v3/search", server.uri()))
        .search("Essential Hypertension", 5)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].identifier.as_deref(), Some("I10"));
    assert_eq!(rows[0].rank, Some(1));
    assert_eq!(rows[0].source.as_deref(), Some("ICD10CM"));
}
