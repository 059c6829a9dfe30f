use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{CreditingAlertEvent, DepositCompletedEvent, EventHandler, EventProducer, Handler};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub deposit_completed_producer: Vec<EventProducer<DepositCompletedEvent>>,
    pub crediting_alert_producer: Vec<EventProducer<CreditingAlertEvent>>,
}

pub struct EventHandlers {
    pub on_deposit_completed: Option<EventHandler<DepositCompletedEvent>>,
    pub on_crediting_alert: Option<EventHandler<CreditingAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_deposit_completed = hooks.on_deposit_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_crediting_alert = hooks.on_crediting_alert.map(|f| EventHandler::new(buffer_size, f));
        Self { on_deposit_completed, on_crediting_alert }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_deposit_completed {
            result.deposit_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_crediting_alert {
            result.crediting_alert_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_deposit_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_crediting_alert {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_deposit_completed: Option<Handler<DepositCompletedEvent>>,
    pub on_crediting_alert: Option<Handler<CreditingAlertEvent>>,
}

impl EventHooks {
    pub fn on_deposit_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DepositCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_deposit_completed = Some(Arc::new(f));
        self
    }

    pub fn on_crediting_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CreditingAlertEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_crediting_alert = Some(Arc::new(f));
        self
    }
}
