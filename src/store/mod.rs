pub mod catalog;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::order::{Order, OrderFilter, OrderList};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Persistence for the order aggregate. Orders are never deleted.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), AppError>;

    /// Replaces the stored document with `order`.
    async fn update(&self, order: &Order) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, AppError>;

    /// Orders matching `filter`, ascending by id, starting after `filter.token`.
    ///
    /// `filter.driver` matches orders assigned to that driver as well as
    /// unassigned ones still waiting for a driver that has not been banned
    /// from them.
    async fn find_all(&self, filter: &OrderFilter) -> Result<OrderList, AppError>;
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

fn filter_accepts(order: &Order, filter: &OrderFilter) -> bool {
    if let Some(rider) = &filter.rider {
        if &order.rider != rider {
            return false;
        }
    }

    if let Some(driver) = &filter.driver {
        match &order.driver {
            Some(assigned) if assigned != driver => return false,
            Some(_) => {}
            None if order.is_banned(driver) || !order.status.is_dispatchable() => return false,
            None => {}
        }
    }

    if let Some(status) = filter.status {
        if order.status != status {
            return false;
        }
    }

    if let Some(token) = filter.token.as_deref().filter(|token| !token.is_empty()) {
        if order.id.as_str() <= token {
            return false;
        }
    }

    true
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), AppError> {
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Internal(format!(
                "order {} already stored",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, order: &Order) -> Result<(), AppError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order.id)))?;

        *stored = order.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_all(&self, filter: &OrderFilter) -> Result<OrderList, AppError> {
        let limit = if filter.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            filter.limit
        };

        let mut data: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter_accepts(entry.value(), filter))
            .map(|entry| entry.value().clone())
            .collect();
        data.sort_by(|a, b| a.id.cmp(&b.id));

        let has_more = data.len() > limit;
        data.truncate(limit);
        let token = if has_more {
            data.last().map(|order| order.id.clone())
        } else {
            None
        };

        Ok(OrderList { token, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{Item, OrderStatus};

    fn order(id: &str, rider: &str) -> Order {
        Order::new(id.into(), rider.into(), Item::default(), "CUP".into())
    }

    #[tokio::test]
    async fn pages_through_orders_by_id() {
        let repo = InMemoryOrderRepository::new();
        for id in ["05", "01", "03", "02", "04"] {
            repo.insert(&order(id, "rider")).await.unwrap();
        }

        let mut filter = OrderFilter {
            limit: 2,
            ..OrderFilter::default()
        };
        let first = repo.find_all(&filter).await.unwrap();
        assert_eq!(ids(&first), vec!["01", "02"]);
        assert_eq!(first.token.as_deref(), Some("02"));

        filter.token = first.token;
        let second = repo.find_all(&filter).await.unwrap();
        assert_eq!(ids(&second), vec!["03", "04"]);

        filter.token = second.token;
        let last = repo.find_all(&filter).await.unwrap();
        assert_eq!(ids(&last), vec!["05"]);
        assert!(last.token.is_none());
    }

    #[tokio::test]
    async fn driver_filter_sees_assigned_and_open_orders() {
        let repo = InMemoryOrderRepository::new();

        let mut mine = order("a", "rider");
        mine.status = OrderStatus::OnTheWay;
        mine.driver = Some("d1".into());

        let mut theirs = order("b", "rider");
        theirs.status = OrderStatus::OnTheWay;
        theirs.driver = Some("d2".into());

        let mut open = order("c", "rider");
        open.status = OrderStatus::Confirmed;

        let mut banned = order("d", "rider");
        banned.status = OrderStatus::WaitingDriver;
        banned.ban_driver("d1");

        let draft = order("e", "rider");

        for o in [&mine, &theirs, &open, &banned, &draft] {
            repo.insert(o).await.unwrap();
        }

        let filter = OrderFilter {
            driver: Some("d1".into()),
            ..OrderFilter::default()
        };
        let list = repo.find_all(&filter).await.unwrap();
        assert_eq!(ids(&list), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn update_of_missing_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let err = repo.update(&order("x", "rider")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_one_id_store_it_once() {
        let repo = std::sync::Arc::new(InMemoryOrderRepository::new());

        let mut tasks = Vec::new();
        for n in 0..8 {
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move {
                repo.insert(&order("dup", &format!("rider-{n}"))).await
            }));
        }

        let mut stored = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => stored += 1,
                Err(AppError::Internal(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(stored, 1);
        assert!(repo.find_by_id("dup").await.unwrap().is_some());
    }

    fn ids(list: &OrderList) -> Vec<&str> {
        list.data.iter().map(|o| o.id.as_str()).collect()
    }
}
