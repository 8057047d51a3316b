pub mod cart_item;
pub mod category;
pub mod customer_order;
pub mod order_item;
pub mod product;
pub mod role;
pub mod shopping_cart;
pub mod user;
pub mod user_role;

pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use customer_order::{Entity as CustomerOrder, Model as CustomerOrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use role::{Entity as Role, Model as RoleModel};
pub use shopping_cart::{Entity as ShoppingCart, Model as ShoppingCartModel};
pub use user::{Entity as User, Model as UserModel};
pub use user_role::{Entity as UserRole, Model as UserRoleModel};
