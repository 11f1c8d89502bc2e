// storefront/src/models/mod.rs

//! Data structures representing stored entities and the inputs that create
//! or change them.

pub mod cart;
pub mod order;
pub mod product;
pub mod review;
pub mod user;

pub use cart::{Cart, CartItem, CartLineView, CartView};
pub use order::{NewOrderItem, Order, OrderItem, OrderStatus, OrderWithItems};
pub use product::{NewProduct, Product, ProductFilter, ProductPage, ProductPatch, ProductWithReviews};
pub use review::{rating_in_range, NewReview, Review, ReviewPatch, ReviewWithAuthor, MAX_RATING, MIN_RATING};
pub use user::{NewUser, User, UserRole};
