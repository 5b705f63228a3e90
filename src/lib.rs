pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use cli::{AdminCommands, Commands, OutputFormat};

pub use application::{
    ActingContext, CarInventoryUseCase, Clock, FixedClock, NewCar, NewRental, NewUser,
    RentalLifecycleUseCase, RentalQueriesUseCase, RentalStore, ReportsUseCase, StoreSession,
    SystemClock, TransactionOptions, UnitOfWork, UserAccountsUseCase,
};

pub use connector::{Container, ContainerConfig, DuckdbRentalStore, InMemoryRentalStore, Router};

pub use domain::{
    Car, CarDetails, CarStatus, DomainError, HistoryAction, Rental, RentalHistory, RentalStatus,
    Role, User,
};
