use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::{Pagination, RequestDescriptor, ResponseEnvelope};
use crate::exchanges::coinbase::types::{BookLevel, Order, OrderBook, Page, Product};
use tracing::instrument;

/// Typed Coinbase endpoints over any `RestClient`
#[derive(Debug)]
pub struct CoinbaseRest<R: RestClient> {
    rest_client: R,
}

impl<R: RestClient> CoinbaseRest<R> {
    pub fn new(rest_client: R) -> Self {
        Self { rest_client }
    }

    pub fn client(&self) -> &R {
        &self.rest_client
    }

    /// Run a raw request; every HTTP status comes back as an envelope
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseEnvelope, ExchangeError> {
        self.rest_client.execute(request).await
    }

    /// All products listed on the exchange; no credentials needed
    #[instrument(skip(self))]
    pub async fn get_products(&self) -> Result<Vec<Product>, ExchangeError> {
        self.rest_client
            .execute_json(&RequestDescriptor::get("/products"))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_product_order_book(
        &self,
        product_id: &str,
        level: BookLevel,
    ) -> Result<OrderBook, ExchangeError> {
        if product_id.trim().is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "A product id is required".to_string(),
            ));
        }

        let path = format!("/products/{}/book?level={}", product_id, level.as_u8());
        self.rest_client
            .execute_json(&RequestDescriptor::get(path))
            .await
    }

    /// One page of orders, filtered by status; requires a signing client.
    ///
    /// Without `pagination` the exchange's default page is returned.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        statuses: &[&str],
        pagination: Option<Pagination>,
    ) -> Result<Page<Order>, ExchangeError> {
        let mut request = RequestDescriptor::get("/orders").with_status(statuses.iter().copied());
        if let Some(p) = pagination {
            request = request.paged(p.cursor, p.limit);
        }

        let response = self.rest_client.execute(&request).await?;
        Ok(Page {
            items: response.decode()?,
            before: response.cursor_before(),
            after: response.cursor_after(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedRest {
        response: ResponseEnvelope,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl CannedRest {
        fn new(status: u16, headers: Vec<(&str, &str)>, body: &str) -> Self {
            Self {
                response: ResponseEnvelope::new(
                    status,
                    headers
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body.to_string(),
                ),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RestClient for CannedRest {
        async fn execute(
            &self,
            request: &RequestDescriptor,
        ) -> Result<ResponseEnvelope, ExchangeError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_order_book_path_and_decode() {
        let rest = CoinbaseRest::new(CannedRest::new(
            200,
            vec![],
            r#"{"sequence":7,"bids":[["1.5","2",1]],"asks":[]}"#,
        ));

        let book = rest
            .get_product_order_book("BTC-USD", BookLevel::Aggregated)
            .await
            .unwrap();
        assert_eq!(book.sequence, 7);

        let seen = rest.client().seen.lock().unwrap();
        assert_eq!(seen[0].path, "/products/BTC-USD/book?level=2");
        assert!(!seen[0].is_pageable());
    }

    #[tokio::test]
    async fn test_blank_product_id_makes_no_call() {
        let rest = CoinbaseRest::new(CannedRest::new(200, vec![], "{}"));
        let result = rest.get_product_order_book(" ", BookLevel::Best).await;
        assert!(matches!(result, Err(ExchangeError::InvalidParameters(_))));
        assert!(rest.client().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_builds_filters_and_reads_cursors() {
        let rest = CoinbaseRest::new(CannedRest::new(
            200,
            vec![("CB-BEFORE", "40"), ("cb-after", "31")],
            r#"[{"id":"o1","product_id":"BTC-USD","side":"sell","status":"open"}]"#,
        ));

        let page = rest
            .list_orders(&["open", "pending"], Some(Pagination::new(-30, Some(5))))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.before, Some(40));
        assert_eq!(page.after, Some(31));

        let seen = rest.client().seen.lock().unwrap();
        assert_eq!(seen[0].status, vec!["open", "pending"]);
        assert_eq!(seen[0].pagination, Some(Pagination::new(-30, Some(5))));
    }

    #[tokio::test]
    async fn test_error_status_becomes_api_error() {
        let rest = CoinbaseRest::new(CannedRest::new(
            401,
            vec![],
            r#"{"message":"invalid signature"}"#,
        ));
        match rest.get_products().await {
            Err(ExchangeError::ApiError { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "invalid signature");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
