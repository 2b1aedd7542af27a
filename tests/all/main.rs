mod consumers;
mod facade;
mod helpers;
mod messages;
