use super::command_reader::Command;
use super::outcome_writer::Outcome;
use crate::application::booking::BookingOrchestrator;
use crate::application::payments::PaymentService;
use crate::application::sweeper::ExpirySweeper;
use tracing::debug;

/// Routes parsed commands to the services and turns every result into outcome rows.
///
/// Service errors never abort the batch; they become rows with the error kind as status.
pub struct BatchRunner {
    orchestrator: BookingOrchestrator,
    payments: PaymentService,
    sweeper: ExpirySweeper,
}

impl BatchRunner {
    pub fn new(orchestrator: BookingOrchestrator, payments: PaymentService, sweeper: ExpirySweeper) -> Self {
        Self {
            orchestrator,
            payments,
            sweeper,
        }
    }

    pub async fn run(&self, command: Command) -> Vec<Outcome> {
        let op = command.op();
        let account = command.account().to_string();
        debug!(op, %account, "running command");

        let result = match command {
            Command::AddCard {
                account: who,
                card,
                cvc,
                phone,
            } => self
                .payments
                .add_card(&who, &card, &cvc, &phone)
                .await
                .map(|()| vec![Outcome::ok(op, &who)]),
            Command::AddFunds { account: who, amount } => self
                .payments
                .add_funds(&who, amount)
                .await
                .map(|balance| vec![Outcome::ok(op, &who).with_balance(balance)]),
            Command::Pay { account: who, amount } => self
                .payments
                .pay(&who, amount)
                .await
                .map(|balance| vec![Outcome::ok(op, &who).with_balance(balance)]),
            Command::GetCard { account: who } => match self.payments.get_card(&who).await {
                Ok(card) => self
                    .payments
                    .balance(&who)
                    .await
                    .map(|balance| vec![Outcome::card(&who, card, balance)]),
                Err(err) => Err(err),
            },
            Command::Book(request) => {
                let who = request.account.clone();
                self.orchestrator
                    .book(request)
                    .await
                    .map(|receipt| vec![Outcome::booked(&who, &receipt)])
            }
            Command::Cancel {
                account: who,
                reservation,
            } => self
                .orchestrator
                .cancel_booking(&who, reservation)
                .await
                .map(|receipt| vec![Outcome::canceled(&who, reservation, &receipt)]),
            Command::List { account: who } => self
                .orchestrator
                .list_bookings(&who)
                .await
                .map(|bookings| bookings.iter().map(Outcome::listed).collect()),
            Command::Boxes => Ok(self
                .orchestrator
                .list_boxes()
                .iter()
                .map(Outcome::catalog_entry)
                .collect()),
            Command::Sweep => self.sweeper.sweep_once().await.map(|swept| {
                vec![Outcome {
                    amount: u64::try_from(swept).ok(),
                    ..Outcome::ok(op, "")
                }]
            }),
        };

        result.unwrap_or_else(|err| vec![Outcome::failed(op, &account, &err)])
    }
}
