/*!
# Canteen Ordering Service

A web application for ordering food at campus canteens, built in Rust.

## Overview

Users browse the item catalog of a canteen, place orders that hand back a
4-digit token, and look through their own order history. Administrators
maintain the catalog of each canteen and clear out served orders.

## Architecture

### Web Layer
- **Technologies**: axum, handlebars, tower-http
- **Key Components**:
  - Pages - server-rendered HTML for login, signup, ordering, history and admin
  - JSON API - catalog listing, order placement, admin item/order management
  - Session middleware - resolves the `session` cookie to a verified principal
  - Message relay - forwards chat text to a chat-completion service

### Core Layer
- **Document store** - named JSON collections (`items`, `items1`, `items2`,
  `orders`, `user_detail`, `admin`) persisted atomically in one file
- **Order placement** - sold-counter increment and order append as one unit
- **Credentials** - Argon2 hashes, exact-match login, atomic signup

## Canteens

| Label | Item collection |
|-------|-----------------|
| IT    | `items`         |
| MBA   | `items1`        |
| MAIN  | `items2`        |

## Modules

- **config**: environment configuration
- **models**: canteens, items, orders, credentials, principals
- **store**: the document store
- **token**: order token generation
- **auth**: signup, login, sessions and the auth middleware
- **catalog**: catalog listing and admin item editing
- **orders**: order placement, history and admin order management
- **chat**: message relay
- **pages**: handlebars page renderer
- **app**: routing, shared state and the server loop

## REST API Endpoints

- `GET /api/canteens/{canteen}/items` - Lists a canteen's items
- `POST /api/orders` - Places an order (user session)
- `GET /api/orders` - Own order history (user session)
- `POST /api/admin/canteens/{canteen}/items` - Creates an item (admin session)
- `PUT|DELETE /api/admin/canteens/{canteen}/items/{id}` - Edits/removes an item
- `GET /api/admin/orders?canteen=` - Lists a canteen's orders
- `DELETE /api/admin/orders/{id}` - Removes an order
- `POST /api/chatbot` - Message relay
*/

pub mod config;
pub mod models;
pub mod store;
pub mod token;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod auth;
#[cfg(feature = "web")]
pub mod catalog;
#[cfg(feature = "web")]
pub mod chat;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod orders;
#[cfg(feature = "web")]
pub mod pages;

pub use models::*;
pub use store::{Database, StoreError};
